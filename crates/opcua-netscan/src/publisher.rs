// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery result publishing.
//!
//! A merged result set is flattened into one event per (application,
//! endpoint) pair followed by exactly one sentinel event carrying the
//! request metadata. Every event gets a 0-based index in emission order so
//! consumers can detect truncated batches.

use crate::model::{ApplicationRegistration, DiscoveryEvent, DiscoveryResult};
use crate::request::DiscoveryRequest;
use async_trait::async_trait;
use tracing::info;

/// Content type identifying discovery event payloads to consumers.
pub const DISCOVERY_EVENTS_CONTENT_TYPE: &str = "application/x-discovery-event-v2-json";

/// The event upload sink.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Send one batch of serialized event bodies, at-least-once.
    async fn send(&self, bodies: Vec<Vec<u8>>, content_type: &str) -> std::io::Result<()>;
}

/// Build the ordered event batch for one pass.
pub fn build_events(
    discovered: &[ApplicationRegistration],
    timestamp: u64,
    request: &DiscoveryRequest,
    diagnostics: Option<serde_json::Value>,
) -> Vec<DiscoveryEvent> {
    let mut events: Vec<DiscoveryEvent> = discovered
        .iter()
        .flat_map(|server| {
            server.endpoints.iter().map(|registration| DiscoveryEvent {
                index: 0,
                application: Some(server.application.clone()),
                registration: Some(registration.clone()),
                time_stamp: timestamp,
                result: None,
            })
        })
        .collect();
    events.push(DiscoveryEvent {
        index: 0,
        application: None,
        registration: None, // last
        time_stamp: timestamp,
        result: Some(DiscoveryResult {
            id: request.id,
            discovery_config: request.config.clone(),
            register_only: !request.is_scan(),
            diagnostics,
        }),
    });
    for (index, event) in events.iter_mut().enumerate() {
        event.index = index;
    }
    events
}

/// Serialize and upload one pass's results.
pub async fn publish(
    sink: &dyn EventSink,
    discovered: &[ApplicationRegistration],
    timestamp: u64,
    request: &DiscoveryRequest,
    diagnostics: Option<serde_json::Value>,
) -> Result<(), PublishError> {
    info!("{}: uploading {} results...", request.id, discovered.len());
    let events = build_events(discovered, timestamp, request, diagnostics);
    let mut bodies = Vec::with_capacity(events.len());
    for event in &events {
        bodies.push(serde_json::to_vec(event).map_err(|e| PublishError::Serialize(e.to_string()))?);
    }
    sink.send(bodies, DISCOVERY_EVENTS_CONTENT_TYPE)
        .await
        .map_err(|e| PublishError::Send(e.to_string()))?;
    info!("{}: {} results uploaded", request.id, discovered.len());
    Ok(())
}

/// Publish error types.
#[derive(Debug, Clone)]
pub enum PublishError {
    Serialize(String),
    Send(String),
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialize(s) => write!(f, "Serialize error: {}", s),
            Self::Send(s) => write!(f, "Send error: {}", s),
        }
    }
}

impl std::error::Error for PublishError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiscoveryConfig, DiscoveryMode};
    use crate::model::{
        ApplicationInfo, ApplicationType, EndpointDescription, EndpointRegistration, SecurityMode,
    };
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    fn registration(uri: &str, endpoint_count: usize) -> ApplicationRegistration {
        ApplicationRegistration {
            application: ApplicationInfo {
                application_uri: uri.into(),
                application_name: None,
                application_type: ApplicationType::Server,
                product_uri: None,
                discovery_urls: BTreeSet::new(),
                capabilities: BTreeSet::new(),
                site_id: None,
                supervisor_id: None,
            },
            endpoints: (0..endpoint_count)
                .map(|i| EndpointRegistration {
                    endpoint: EndpointDescription {
                        url: format!("opc.tcp://h:{}", 4840 + i),
                        security_mode: SecurityMode::None,
                        security_policy: None,
                        server_certificate: None,
                        transport_profile_uri: None,
                    },
                    accessible_endpoint_url: format!("opc.tcp://10.0.0.1:{}", 4840 + i),
                    site_id: None,
                    supervisor_id: None,
                })
                .collect(),
        }
    }

    struct MemorySink {
        batches: Mutex<Vec<(Vec<Vec<u8>>, String)>>,
    }

    #[async_trait]
    impl EventSink for MemorySink {
        async fn send(&self, bodies: Vec<Vec<u8>>, content_type: &str) -> std::io::Result<()> {
            self.batches
                .lock()
                .unwrap()
                .push((bodies, content_type.to_string()));
            Ok(())
        }
    }

    fn request(mode: DiscoveryMode) -> DiscoveryRequest {
        DiscoveryRequest::new(mode, DiscoveryConfig::default())
    }

    #[test]
    fn test_sentinel_completeness() {
        let discovered = vec![registration("urn:a", 2), registration("urn:b", 3)];
        let events = build_events(&discovered, 1000, &request(DiscoveryMode::Fast), None);

        // E endpoint events plus exactly one sentinel, indices 0..=E.
        assert_eq!(events.len(), 6);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.index, i);
            assert_eq!(event.time_stamp, 1000);
        }
        let sentinel = events.last().unwrap();
        assert!(sentinel.registration.is_none());
        assert!(sentinel.application.is_none());
        assert!(sentinel.result.is_some());
        assert!(events[..5].iter().all(|e| e.result.is_none()));
    }

    #[test]
    fn test_empty_result_set_is_sentinel_only() {
        let events = build_events(&[], 1000, &request(DiscoveryMode::Fast), None);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].index, 0);
        assert!(events[0].result.is_some());
    }

    #[test]
    fn test_register_only_flag_tracks_mode() {
        let events = build_events(&[], 1000, &request(DiscoveryMode::Off), None);
        assert!(events[0].result.as_ref().unwrap().register_only);

        let events = build_events(&[], 1000, &request(DiscoveryMode::Scan), None);
        assert!(!events[0].result.as_ref().unwrap().register_only);
    }

    #[test]
    fn test_diagnostics_ride_the_sentinel() {
        let diagnostics = serde_json::json!({"error": "sweep failed"});
        let events = build_events(
            &[],
            1000,
            &request(DiscoveryMode::Fast),
            Some(diagnostics.clone()),
        );
        assert_eq!(events[0].result.as_ref().unwrap().diagnostics, Some(diagnostics));
    }

    #[tokio::test]
    async fn test_publish_sends_utf8_json_batch() {
        let sink = MemorySink {
            batches: Mutex::new(Vec::new()),
        };
        let discovered = vec![registration("urn:a", 1)];
        publish(&sink, &discovered, 42, &request(DiscoveryMode::Fast), None)
            .await
            .unwrap();

        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let (bodies, content_type) = &batches[0];
        assert_eq!(content_type, DISCOVERY_EVENTS_CONTENT_TYPE);
        assert_eq!(bodies.len(), 2);
        let event: DiscoveryEvent = serde_json::from_slice(&bodies[0]).unwrap();
        assert_eq!(event.index, 0);
        let sentinel: DiscoveryEvent = serde_json::from_slice(&bodies[1]).unwrap();
        assert_eq!(sentinel.index, 1);
        assert!(sentinel.result.is_some());
    }
}
