// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Probe interfaces and the built-in TCP and opc.tcp probes.
//!
//! A liveness probe answers "does anything respond at this address", a
//! server probe answers "is this endpoint plausibly an OPC UA listener".
//! Both are trait objects so platform probes (raw ICMP echo, hardware
//! inventory lookups) can be plugged in without touching the sweepers.

use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::trace;

/// Probes whether an address responds at all.
#[async_trait]
pub trait LivenessProber: Send + Sync {
    /// Probe one address. A timeout is a negative result, not an error.
    async fn probe(&self, address: Ipv4Addr, timeout: Duration) -> bool;
}

/// Probes whether an endpoint is plausibly an OPC UA server.
#[async_trait]
pub trait ServerProber: Send + Sync {
    /// Probe one endpoint. A timeout is a negative result, not an error.
    async fn probe(&self, endpoint: SocketAddr, timeout: Duration) -> bool;
}

/// Liveness probe that attempts a TCP connect to the discovery port.
///
/// Raw ICMP echo needs elevated privileges; a connect attempt to the
/// well-known port answers the same reachability question unprivileged.
#[derive(Debug, Clone)]
pub struct TcpProber {
    port: u16,
}

impl TcpProber {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new(crate::DEFAULT_DISCOVERY_PORT)
    }
}

#[async_trait]
impl LivenessProber for TcpProber {
    async fn probe(&self, address: Ipv4Addr, timeout: Duration) -> bool {
        let endpoint = SocketAddr::new(IpAddr::V4(address), self.port);
        match tokio::time::timeout(timeout, TcpStream::connect(endpoint)).await {
            Ok(Ok(_)) => true,
            // A refused connect still proves a live host.
            Ok(Err(e)) => e.kind() == std::io::ErrorKind::ConnectionRefused,
            Err(_) => false,
        }
    }
}

/// Server probe speaking the opc.tcp Hello handshake.
///
/// Sends a Hello message and accepts the endpoint if the peer answers with
/// an Acknowledge or a protocol-level Error header. A port that accepts the
/// connection but answers anything else is not an OPC UA listener.
#[derive(Debug, Clone, Default)]
pub struct HelloProbe;

impl HelloProbe {
    async fn exchange(endpoint: SocketAddr) -> std::io::Result<bool> {
        let mut stream = TcpStream::connect(endpoint).await?;
        let hello = encode_hello(&format!("opc.tcp://{}", endpoint));
        stream.write_all(&hello).await?;
        stream.flush().await?;

        let mut header = [0u8; 8];
        stream.read_exact(&mut header).await?;
        Ok(&header[0..3] == b"ACK" || &header[0..3] == b"ERR")
    }
}

#[async_trait]
impl ServerProber for HelloProbe {
    async fn probe(&self, endpoint: SocketAddr, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, Self::exchange(endpoint)).await {
            Ok(Ok(is_server)) => is_server,
            Ok(Err(e)) => {
                trace!("probe {} failed: {}", endpoint, e);
                false
            }
            Err(_) => false,
        }
    }
}

/// Encode an opc.tcp Hello message for the given endpoint url.
fn encode_hello(endpoint_url: &str) -> Vec<u8> {
    const PROTOCOL_VERSION: u32 = 0;
    const BUFFER_SIZE: u32 = 65_535;

    let mut message = Vec::with_capacity(32 + endpoint_url.len());
    message.extend_from_slice(b"HELF");
    message.extend_from_slice(&0u32.to_le_bytes()); // length, patched below
    message.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());
    message.extend_from_slice(&BUFFER_SIZE.to_le_bytes()); // receive buffer
    message.extend_from_slice(&BUFFER_SIZE.to_le_bytes()); // send buffer
    message.extend_from_slice(&0u32.to_le_bytes()); // max message size
    message.extend_from_slice(&0u32.to_le_bytes()); // max chunk count
    message.extend_from_slice(&(endpoint_url.len() as u32).to_le_bytes());
    message.extend_from_slice(endpoint_url.as_bytes());

    let length = message.len() as u32;
    message[4..8].copy_from_slice(&length.to_le_bytes());
    message
}
