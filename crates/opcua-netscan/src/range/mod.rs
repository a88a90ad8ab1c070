// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Address and port range sets.
//!
//! Ranges are ordered, possibly sparse interval sets parsed from the textual
//! syntax `a.b.c.d/n`, `a.b.c.d-e.f.g.h`, `lo-hi` and `*`, with comma or
//! semicolon separated entries. Overlapping entries are merged on parse so a
//! resolved set is always sorted and disjoint.

mod address;
mod port;

pub use address::AddressRange;
pub use port::{PortEndpoints, PortRange};

/// Range parse error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeParseError(pub String);

impl std::fmt::Display for RangeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid range syntax: {}", self.0)
    }
}

impl std::error::Error for RangeParseError {}

/// Format a series of ranges with the textual syntax.
pub fn format_ranges<T: std::fmt::Display>(ranges: &[T]) -> String {
    let mut out = String::new();
    for (i, range) in ranges.iter().enumerate() {
        if i != 0 {
            out.push(';');
        }
        out.push_str(&range.to_string());
    }
    out
}
