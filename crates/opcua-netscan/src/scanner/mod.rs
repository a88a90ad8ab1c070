// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded-concurrency network and port sweeps.
//!
//! Both sweepers fan probes out over a candidate space with a hard cap on
//! concurrently outstanding probes, expose lock-free progress counters for
//! an outside progress logger, and honor cooperative cancellation: once the
//! token fires no new probe is launched, in-flight probes finish or time
//! out, and whatever was collected so far is returned.

mod netscan;
mod portscan;

pub use netscan::NetworkScanner;
pub use portscan::PortScanner;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Marker returned when a sweep or resolution pass was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Progress counters of a running sweep.
///
/// Updated from probe tasks with relaxed atomics; safe to poll from a
/// timer-driven progress logger while the sweep runs.
#[derive(Debug, Default)]
pub struct ScanProgress {
    scanned: AtomicUsize,
    active: AtomicUsize,
    found: AtomicUsize,
}

impl ScanProgress {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of candidates probed so far.
    pub fn scan_count(&self) -> usize {
        self.scanned.load(Ordering::Relaxed)
    }

    /// Number of probes currently in flight.
    pub fn active_probes(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Number of positive results so far.
    pub fn found_count(&self) -> usize {
        self.found.load(Ordering::Relaxed)
    }

    pub(crate) fn probe_started(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn probe_finished(&self, positive: bool) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.scanned.fetch_add(1, Ordering::Relaxed);
        if positive {
            self.found.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Concurrency for a sweep: capped hard by `max_probes`, floored by
/// `min_probes`, and never more slots than candidates need.
pub(crate) fn probe_concurrency(candidates: usize, min_probes: usize, max_probes: usize) -> usize {
    let cap = max_probes.max(1);
    let floor = min_probes.clamp(1, cap);
    candidates.clamp(floor, cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_concurrency_respects_cap() {
        assert_eq!(probe_concurrency(10_000, 1, 250), 250);
        assert_eq!(probe_concurrency(100, 1, 250), 100);
        assert_eq!(probe_concurrency(0, 1, 250), 1);
    }

    #[test]
    fn test_probe_concurrency_floor_never_exceeds_cap() {
        assert_eq!(probe_concurrency(5, 64, 16), 16);
        assert_eq!(probe_concurrency(5, 8, 16), 8);
    }

    #[test]
    fn test_progress_counters() {
        let progress = ScanProgress::new();
        progress.probe_started();
        progress.probe_started();
        assert_eq!(progress.active_probes(), 2);
        progress.probe_finished(true);
        progress.probe_finished(false);
        assert_eq!(progress.active_probes(), 0);
        assert_eq!(progress.scan_count(), 2);
        assert_eq!(progress.found_count(), 1);
    }
}
