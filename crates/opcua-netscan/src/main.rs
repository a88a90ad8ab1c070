// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OPC UA network discovery service.
//!
//! Standalone sweep service for plant and lab networks:
//! - Sweeps configured or derived address ranges for live hosts
//! - Probes ports with the opc.tcp handshake to find OPC UA listeners
//! - Publishes discovery event batches for a downstream registry
//!
//! # Usage
//!
//! ```bash
//! # Continuous fast sweep of the local subnets
//! opcua-netscan --mode fast
//!
//! # Sweep an explicit range on the well-known ports every 10 minutes
//! opcua-netscan --mode scan --address-ranges 10.0.0.0/24 --idle-secs 600
//!
//! # Custom config file
//! opcua-netscan --mode fast --config discovery.json
//! ```
//!
//! The service ships with the unprivileged TCP liveness probe and the
//! opc.tcp Hello probe. Resolving full endpoint registrations needs an OPC
//! UA client stack wired in through the library's `EndpointDiscovery`
//! trait; without one, discovered listeners are visible in the logs and
//! every uploaded batch carries only the sentinel record.

use async_trait::async_trait;
use clap::Parser;
use opcua_netscan::{
    BoundedScheduler, DiscoveredEndpoint, DiscoveryConfig, DiscoveryEngine, DiscoveryMode,
    EndpointDiscovery, EngineServices, EventSink, HelloProbe, Identity, TcpProber,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

/// OPC UA network discovery service - sweeps networks for OPC UA servers
#[derive(Parser, Debug)]
#[command(name = "opcua-netscan")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Discovery mode (off, local, fast, scan)
    #[arg(short, long, default_value = "fast")]
    mode: DiscoveryMode,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address ranges to scan (CIDR / dashed / comma separated)
    #[arg(long)]
    address_ranges: Option<String>,

    /// Port ranges to scan
    #[arg(long)]
    port_ranges: Option<String>,

    /// Explicit discovery urls probed every pass
    #[arg(long = "discovery-url")]
    discovery_urls: Vec<String>,

    /// Idle time between continuous scan passes in seconds
    #[arg(long)]
    idle_secs: Option<u64>,

    /// Device id stamped on discovered registrations
    #[arg(long, default_value = "opcua-netscan")]
    device_id: String,

    /// Site id stamped on discovered registrations
    #[arg(long)]
    site_id: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Load or create config
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading config from {:?}", config_path);
        DiscoveryConfig::from_file(config_path)?
    } else {
        DiscoveryConfig::default()
    };
    if args.address_ranges.is_some() {
        config.address_ranges_to_scan = args.address_ranges.clone();
    }
    if args.port_ranges.is_some() {
        config.port_ranges_to_scan = args.port_ranges.clone();
    }
    if !args.discovery_urls.is_empty() {
        config.discovery_urls = args.discovery_urls.clone();
    }
    if let Some(idle) = args.idle_secs {
        config.idle_time_between_scans_secs = idle;
    }
    config.validate()?;

    info!("+----------------------------------------------------+");
    info!(
        "|       OPC UA Network Discovery v{}              |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Mode:   {:40} |", args.mode.to_string());
    info!(
        "|  Ranges: {:40} |",
        config.address_ranges_to_scan.as_deref().unwrap_or("derived")
    );
    info!(
        "|  Idle:   {:40} |",
        format!("{}s", config.idle_time_between_scans_secs)
    );
    info!("+----------------------------------------------------+");

    let engine = DiscoveryEngine::new(
        EngineServices {
            client: Arc::new(ProbeOnlyDiscovery),
            sink: Arc::new(LoggingEventSink),
            scheduler: Arc::new(BoundedScheduler::default()),
            liveness_prober: Arc::new(TcpProber::default()),
            server_prober: Arc::new(HelloProbe),
            identity: Identity {
                device_id: args.device_id,
                module_id: Some("discovery".into()),
                site_id: args.site_id,
            },
        },
        args.mode,
        config,
    );

    engine.scan().await;

    tokio::signal::ctrl_c().await.ok();
    info!("Shutdown signal received, stopping discovery...");
    engine.stop().await;

    info!("Discovery service stopped");
    Ok(())
}

/// Integration point for a full OPC UA client stack.
///
/// Reports no endpoints, so batches carry only the sentinel; discovered
/// listeners still show up in the scan logs.
struct ProbeOnlyDiscovery;

#[async_trait]
impl EndpointDiscovery for ProbeOnlyDiscovery {
    async fn find_endpoints(
        &self,
        discovery_url: &str,
        _ct: &CancellationToken,
    ) -> std::io::Result<Vec<DiscoveredEndpoint>> {
        debug!("no endpoint discovery client wired for {}", discovery_url);
        Ok(Vec::new())
    }
}

/// Event sink that logs batch sizes instead of uploading.
struct LoggingEventSink;

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn send(&self, bodies: Vec<Vec<u8>>, content_type: &str) -> std::io::Result<()> {
        info!("discovery batch: {} events ({})", bodies.len(), content_type);
        Ok(())
    }
}
