// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OPC UA network discovery engine.
//!
//! Discovers OPC UA servers reachable on a network by sweeping address
//! ranges, probing ports with the opc.tcp handshake, resolving advertised
//! endpoints through a pluggable discovery client, and publishing the
//! deduplicated registrations as an ordered event batch terminated by a
//! sentinel record.
//!
//! Two operating modes are supported: a one-shot pass over a request's
//! urls and ranges, and a continuous background sweep that repeats on an
//! idle-delay cadence until stopped.
//!
//! # Example
//!
//! ```no_run
//! use opcua_netscan::{
//!     BoundedScheduler, DiscoveryConfig, DiscoveryEngine, DiscoveryMode, EngineServices,
//!     HelloProbe, Identity, TcpProber,
//! };
//! use std::sync::Arc;
//!
//! # async fn run(client: Arc<dyn opcua_netscan::EndpointDiscovery>,
//! #              sink: Arc<dyn opcua_netscan::EventSink>) {
//! let engine = DiscoveryEngine::new(
//!     EngineServices {
//!         client,
//!         sink,
//!         scheduler: Arc::new(BoundedScheduler::default()),
//!         liveness_prober: Arc::new(TcpProber::default()),
//!         server_prober: Arc::new(HelloProbe),
//!         identity: Identity::default(),
//!     },
//!     DiscoveryMode::Fast,
//!     DiscoveryConfig::default(),
//! );
//! engine.scan().await;
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod merge;
pub mod model;
pub mod probe;
pub mod publisher;
pub mod range;
pub mod request;
pub mod resolver;
pub mod scanner;
pub mod scheduler;

pub use config::{ConfigError, DiscoveryConfig, DiscoveryMode, NetworkClass};
pub use engine::{DiscoveryCancel, DiscoveryEngine, EngineError, EngineServices};
pub use model::{
    ApplicationInfo, ApplicationRegistration, ApplicationType, DiscoveredEndpoint, DiscoveryEvent,
    DiscoveryResult, EndpointDescription, EndpointRegistration, Identity, SecurityMode,
};
pub use probe::{HelloProbe, LivenessProber, ServerProber, TcpProber};
pub use publisher::{EventSink, DISCOVERY_EVENTS_CONTENT_TYPE};
pub use range::{AddressRange, PortRange};
pub use request::DiscoveryRequest;
pub use resolver::EndpointDiscovery;
pub use scanner::{NetworkScanner, PortScanner, ScanProgress};
pub use scheduler::{BoundedScheduler, TaskScheduler};

/// The registered OPC UA discovery port.
pub const DEFAULT_DISCOVERY_PORT: u16 = 4840;
