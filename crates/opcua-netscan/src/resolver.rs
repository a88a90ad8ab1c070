// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoint resolution against discovered urls.
//!
//! Resolution drives the OPC UA discovery call for every candidate and
//! merges the returned endpoint descriptions into per-application
//! registrations. A failing or empty candidate never aborts resolution of
//! the others; it only surfaces as an absent registration.

use crate::merge;
use crate::model::{ApplicationRegistration, DiscoveredEndpoint, Identity};
use crate::request::DiscoveryRequest;
use crate::scanner::Cancelled;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The OPC UA discovery client: retrieves a server's advertised endpoints.
#[async_trait]
pub trait EndpointDiscovery: Send + Sync {
    /// Issue the discovery call against a url.
    async fn find_endpoints(
        &self,
        discovery_url: &str,
        ct: &CancellationToken,
    ) -> std::io::Result<Vec<DiscoveredEndpoint>>;
}

/// Resolves candidate endpoints into application registrations.
pub struct EndpointResolver {
    client: Arc<dyn EndpointDiscovery>,
    identity: Identity,
}

impl EndpointResolver {
    pub fn new(client: Arc<dyn EndpointDiscovery>, identity: Identity) -> Self {
        Self { client, identity }
    }

    /// Resolve one discovery url into its advertised endpoints.
    pub async fn resolve(
        &self,
        discovery_url: &str,
        ct: &CancellationToken,
    ) -> Vec<DiscoveredEndpoint> {
        match self.client.find_endpoints(discovery_url, ct).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!("failed to find endpoints on {}: {}", discovery_url, e);
                Vec::new()
            }
        }
    }

    /// Resolve every candidate (endpoint address → discovery url) into a
    /// merged registration list.
    pub async fn discover_servers(
        &self,
        request: &DiscoveryRequest,
        candidates: BTreeMap<SocketAddr, String>,
        ct: &CancellationToken,
    ) -> Result<Vec<ApplicationRegistration>, Cancelled> {
        let mut discovered: BTreeMap<String, ApplicationRegistration> = BTreeMap::new();
        info!(
            "{}: searching {} discovery urls for endpoints...",
            request.id,
            candidates.len()
        );
        for (endpoint, url) in candidates {
            if ct.is_cancelled() {
                return Err(Cancelled);
            }
            // Query at the address that actually answered, not the
            // possibly unresolvable advertised host name.
            let accessible = url_with_host(&url, endpoint);
            debug!("{}: finding endpoints on {}...", request.id, accessible);

            let endpoints = self.resolve(&accessible, ct).await;
            if endpoints.is_empty() {
                info!("{}: no endpoints found on {}", request.id, accessible);
                continue;
            }
            info!(
                "{}: found {} endpoints on {}",
                request.id,
                endpoints.len(),
                accessible
            );
            for found in endpoints {
                let registration = found.into_registration(&self.identity);
                merge::add_or_update(&mut discovered, registration);
            }
        }
        info!(
            "{}: found total of {} servers",
            request.id,
            discovered.len()
        );
        if ct.is_cancelled() {
            return Err(Cancelled);
        }
        Ok(discovered.into_values().collect())
    }
}

/// Resolve explicit discovery urls to concrete candidate endpoints.
///
/// IP literal hosts short-circuit; names go through DNS with IPv4
/// preferred and IPv6 as fallback. A url that fails to resolve simply
/// contributes no candidates.
pub async fn resolve_discovery_urls(urls: &[String]) -> BTreeMap<SocketAddr, String> {
    let mut candidates = BTreeMap::new();
    for url in urls {
        for endpoint in resolve_host_entry(url).await {
            candidates.insert(endpoint, url.clone());
        }
    }
    candidates
}

async fn resolve_host_entry(url: &str) -> Vec<SocketAddr> {
    let Some((host, port)) = parse_discovery_url(url) else {
        warn!("ignoring malformed discovery url {}", url);
        return Vec::new();
    };
    if let Ok(ip) = host.parse::<IpAddr>() {
        return vec![SocketAddr::new(ip, port)];
    }
    let resolved = match tokio::net::lookup_host((host.as_str(), port)).await {
        Ok(addresses) => {
            let all: Vec<SocketAddr> = addresses.collect();
            let v4: Vec<SocketAddr> = all.iter().copied().filter(SocketAddr::is_ipv4).collect();
            if v4.is_empty() {
                all
            } else {
                v4
            }
        }
        Err(e) => {
            warn!("failed to resolve the host for {}: {}", url, e);
            Vec::new()
        }
    };
    resolved
}

/// Extract host and port from an `opc.tcp://` discovery url.
pub(crate) fn parse_discovery_url(url: &str) -> Option<(String, u16)> {
    let rest = url.strip_prefix("opc.tcp://")?;
    let authority = rest.split(['/', '?']).next().unwrap_or(rest);
    if authority.is_empty() {
        return None;
    }
    if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, rest) = bracketed.split_once(']')?;
        let port = rest
            .strip_prefix(':')
            .and_then(|p| p.parse().ok())
            .unwrap_or(crate::DEFAULT_DISCOVERY_PORT);
        return Some((host.to_string(), port));
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => Some((
            host.to_string(),
            port.parse().unwrap_or(crate::DEFAULT_DISCOVERY_PORT),
        )),
        _ => Some((authority.to_string(), crate::DEFAULT_DISCOVERY_PORT)),
    }
}

/// Rebuild a discovery url with its host replaced by a concrete endpoint.
fn url_with_host(url: &str, endpoint: SocketAddr) -> String {
    let suffix = url
        .strip_prefix("opc.tcp://")
        .and_then(|rest| rest.find(['/', '?']).map(|i| &rest[i..]))
        .unwrap_or("");
    format!("opc.tcp://{}{}", endpoint, suffix)
}
