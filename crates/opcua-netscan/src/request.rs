// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-pass discovery request resolution.
//!
//! A request is built once per scan pass from the mode and configuration.
//! Construction clones the configuration and resolves the address and port
//! search spaces up front, so a running pass is never affected by concurrent
//! configuration changes. Malformed range strings degrade to "not provided"
//! rather than failing the request.

use crate::config::{DiscoveryConfig, DiscoveryMode, NetworkClass};
use crate::range::{AddressRange, PortRange};
use std::net::{IpAddr, Ipv4Addr};
use tracing::warn;
use uuid::Uuid;

/// An immutable, fully resolved discovery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRequest {
    /// Request id, fresh per pass.
    pub id: Uuid,

    /// Operation mode the pass runs in.
    pub mode: DiscoveryMode,

    /// Interface class considered for derived address ranges.
    pub network_class: NetworkClass,

    /// Snapshot of the configuration the pass runs with.
    pub config: DiscoveryConfig,

    /// Resolved address ranges. None when the mode supplies addresses
    /// another way (off: urls only, local: own addresses).
    pub address_ranges: Option<Vec<AddressRange>>,

    /// Resolved port ranges.
    pub port_ranges: Vec<PortRange>,

    /// Explicit discovery urls probed every pass.
    pub discovery_urls: Vec<String>,
}

impl DiscoveryRequest {
    /// Build a request for the given mode and configuration.
    pub fn new(mode: DiscoveryMode, config: DiscoveryConfig) -> Self {
        Self::with_id(Uuid::new_v4(), mode, config)
    }

    /// Build a request with a caller-supplied id.
    pub fn with_id(id: Uuid, mode: DiscoveryMode, config: DiscoveryConfig) -> Self {
        let address_ranges = resolve_address_ranges(mode, &config);
        let port_ranges = resolve_port_ranges(mode, &config);
        let discovery_urls = config.discovery_urls.clone();
        Self {
            id,
            mode,
            network_class: NetworkClass::default(),
            config,
            address_ranges,
            port_ranges,
            discovery_urls,
        }
    }

    /// Clone this request for a new pass, with a fresh id.
    pub fn renewed(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            ..self.clone()
        }
    }

    /// Whether this request sweeps the network (any mode but off).
    pub fn is_scan(&self) -> bool {
        self.mode != DiscoveryMode::Off
    }

    /// Total number of candidate addresses.
    pub fn total_addresses(&self) -> usize {
        self.address_ranges
            .as_deref()
            .map(AddressRange::total)
            .unwrap_or(0)
    }

    /// Total number of candidate ports per address.
    pub fn total_ports(&self) -> usize {
        PortRange::total(&self.port_ranges)
    }
}

/// Derive the address search space for a mode.
///
/// An explicit, parseable range string always wins. Fast mode falls back to
/// the local /24 of every wired interface plus the default gateways. The
/// other modes leave the space to be supplied elsewhere.
fn resolve_address_ranges(mode: DiscoveryMode, config: &DiscoveryConfig) -> Option<Vec<AddressRange>> {
    if let Some(text) = config.address_ranges_to_scan.as_deref() {
        match AddressRange::try_parse(text) {
            Some(ranges) => return Some(ranges),
            None => warn!(
                "ignoring unparseable address ranges '{}', deriving from mode",
                text
            ),
        }
    }
    match mode {
        DiscoveryMode::Fast => Some(local_subnet_ranges()),
        _ => None,
    }
}

/// Derive the port search space for a mode.
fn resolve_port_ranges(mode: DiscoveryMode, config: &DiscoveryConfig) -> Vec<PortRange> {
    if let Some(text) = config.port_ranges_to_scan.as_deref() {
        match PortRange::try_parse(text) {
            Some(ranges) => return ranges,
            None => warn!(
                "ignoring unparseable port ranges '{}', deriving from mode",
                text
            ),
        }
    }
    match mode {
        DiscoveryMode::Local => PortRange::all(),
        DiscoveryMode::Fast => PortRange::well_known(),
        // Widen coverage with the unassigned space on top of the base set.
        DiscoveryMode::Scan => {
            let mut ranges = PortRange::opc_ua();
            ranges.extend(PortRange::unassigned());
            PortRange::merge(ranges)
        }
        DiscoveryMode::Off => PortRange::opc_ua(),
    }
}

/// The local /24 of every wired interface, plus default gateways as /32s.
fn local_subnet_ranges() -> Vec<AddressRange> {
    let mut ranges: Vec<AddressRange> = local_interface_addresses()
        .into_iter()
        .map(|addr| AddressRange::from_subnet(addr, 24))
        .collect();
    ranges.extend(default_gateways().into_iter().map(AddressRange::single));
    AddressRange::merge(ranges)
}

/// IPv4 addresses of the local wired (non-loopback) interfaces.
pub(crate) fn local_interface_addresses() -> Vec<Ipv4Addr> {
    match local_ip_address::list_afinet_netifas() {
        Ok(interfaces) => interfaces
            .into_iter()
            .filter_map(|(_, addr)| match addr {
                IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
                _ => None,
            })
            .collect(),
        Err(e) => {
            warn!("failed to enumerate network interfaces: {}", e);
            Vec::new()
        }
    }
}

/// Default gateway addresses from the kernel routing table.
#[cfg(target_os = "linux")]
fn default_gateways() -> Vec<Ipv4Addr> {
    let Ok(routes) = std::fs::read_to_string("/proc/net/route") else {
        return Vec::new();
    };
    let mut gateways = Vec::new();
    for line in routes.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // destination 00000000 marks a default route; gateway is hex,
        // little-endian byte order
        if fields.len() > 2 && fields[1] == "00000000" {
            if let Ok(raw) = u32::from_str_radix(fields[2], 16) {
                let gateway = Ipv4Addr::from(raw.swap_bytes());
                if !gateway.is_unspecified() && !gateways.contains(&gateway) {
                    gateways.push(gateway);
                }
            }
        }
    }
    gateways
}

#[cfg(not(target_os = "linux"))]
fn default_gateways() -> Vec<Ipv4Addr> {
    Vec::new()
}
