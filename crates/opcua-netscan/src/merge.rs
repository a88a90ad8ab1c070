// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registration merging.
//!
//! Merging is commutative and associative over a pass, so the completion
//! order of concurrent probes never affects the final result set. When the
//! same endpoint is observed twice, the most recently observed attributes
//! win; last-write-wins is the documented policy, not an accident.

use crate::model::ApplicationRegistration;
use std::collections::BTreeMap;

/// Insert a found registration into the per-application map, or union its
/// endpoints into the existing entry.
///
/// Applications are keyed case-insensitively by application uri. Endpoints
/// are deduplicated by (endpoint url, security mode, security policy); on a
/// key collision the newly found endpoint replaces the stored one.
pub fn add_or_update(
    map: &mut BTreeMap<String, ApplicationRegistration>,
    found: ApplicationRegistration,
) {
    let key = found.application.application_uri.to_ascii_lowercase();
    match map.get_mut(&key) {
        None => {
            map.insert(key, found);
        }
        Some(existing) => {
            existing
                .application
                .capabilities
                .extend(found.application.capabilities);
            existing
                .application
                .discovery_urls
                .extend(found.application.discovery_urls);
            for endpoint in found.endpoints {
                let key = endpoint.dedup_key();
                match existing.endpoints.iter_mut().find(|e| e.dedup_key() == key) {
                    Some(stored) => *stored = endpoint,
                    None => existing.endpoints.push(endpoint),
                }
            }
        }
    }
}
