// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Port sweep driver.

use super::{probe_concurrency, ScanProgress};
use crate::probe::ServerProber;
use crate::range::{PortEndpoints, PortRange};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Map a port range to its per-port endpoints for a fixed address.
///
/// The `impl Fn(&PortRange)` return type carries a higher-ranked bound
/// (`for<'a>`), which the inline closure form could not infer when the
/// resulting iterator is held across an await point.
fn endpoints_for(address: Ipv4Addr) -> impl Fn(&PortRange) -> PortEndpoints {
    move |r| r.endpoints(address)
}

/// Sweeps the cross product of responsive addresses and candidate ports
/// with a bounded number of concurrent protocol probes, collecting the
/// endpoints that answer like an OPC UA server.
pub struct PortScanner {
    prober: Arc<dyn ServerProber>,
    addresses: Vec<Ipv4Addr>,
    ranges: Vec<PortRange>,
    min_probes: usize,
    max_probes: usize,
    /// Fraction of the candidate space that must have been probed before
    /// the sweep may wind down. 100 probes everything.
    min_probes_percent: u8,
    probe_timeout: Duration,
    progress: Arc<ScanProgress>,
}

impl PortScanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        prober: Arc<dyn ServerProber>,
        addresses: Vec<Ipv4Addr>,
        ranges: Vec<PortRange>,
        min_probes: usize,
        max_probes: usize,
        min_probes_percent: u8,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            prober,
            addresses,
            ranges,
            min_probes,
            max_probes,
            min_probes_percent,
            probe_timeout,
            progress: ScanProgress::new(),
        }
    }

    /// Progress counters, pollable while the sweep runs.
    pub fn progress(&self) -> Arc<ScanProgress> {
        self.progress.clone()
    }

    /// Total size of the candidate space.
    pub fn total(&self) -> usize {
        self.addresses.len() * PortRange::total(&self.ranges)
    }

    /// Run the sweep to completion, wind-down or cancellation.
    ///
    /// Candidates are enumerated lazily; the product is never materialized.
    /// Same cancellation contract as the network sweep.
    pub async fn scan(&self, ct: &CancellationToken) -> Vec<SocketAddr> {
        let total = self.total();
        let threshold = wind_down_threshold(total, self.min_probes_percent);
        let concurrency = probe_concurrency(total, self.min_probes, self.max_probes);
        debug!(
            "port sweep over {} endpoints ({} concurrent probes, wind-down at {})",
            total, concurrency, threshold
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ranges = &self.ranges;
        let candidates = self
            .addresses
            .iter()
            .copied()
            .flat_map(move |address| ranges.iter().flat_map(endpoints_for(address)));

        let mut launched = 0usize;
        for endpoint in candidates {
            if launched >= threshold {
                debug!(
                    "winding down port sweep after {} of {} probes",
                    launched, total
                );
                break;
            }
            let permit = tokio::select! {
                biased;
                _ = ct.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let prober = self.prober.clone();
            let progress = self.progress.clone();
            let probe_timeout = self.probe_timeout;
            let tx = tx.clone();
            tokio::spawn(async move {
                progress.probe_started();
                let open =
                    tokio::time::timeout(probe_timeout, prober.probe(endpoint, probe_timeout))
                        .await
                        .unwrap_or(false);
                progress.probe_finished(open);
                if open {
                    let _ = tx.send(endpoint);
                }
                drop(permit);
            });
            launched += 1;
        }

        drop(tx);
        let mut open = Vec::new();
        while let Some(endpoint) = rx.recv().await {
            open.push(endpoint);
        }
        open.sort_unstable();
        open
    }
}

/// Number of probes after which the sweep may stop launching new ones.
fn wind_down_threshold(total: usize, percent: u8) -> usize {
    if percent >= 100 {
        return usize::MAX;
    }
    (total * percent as usize).div_ceil(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProbe {
        open: HashSet<SocketAddr>,
        concurrent: AtomicUsize,
        peak: AtomicUsize,
    }

    impl StubProbe {
        fn new(open: impl IntoIterator<Item = SocketAddr>) -> Arc<Self> {
            Arc::new(Self {
                open: open.into_iter().collect(),
                concurrent: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ServerProber for StubProbe {
        async fn probe(&self, endpoint: SocketAddr, _timeout: Duration) -> bool {
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            self.open.contains(&endpoint)
        }
    }

    fn addr(text: &str) -> SocketAddr {
        text.parse().unwrap()
    }

    #[tokio::test]
    async fn test_scan_finds_open_endpoints() {
        let open = [addr("10.0.0.1:4840"), addr("10.0.0.2:4841")];
        let probe = StubProbe::new(open);
        let scanner = PortScanner::new(
            probe,
            vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)],
            PortRange::parse("4840-4845").unwrap(),
            1,
            4,
            100,
            Duration::from_secs(1),
        );
        assert_eq!(scanner.total(), 12);
        let found = scanner.scan(&CancellationToken::new()).await;
        assert_eq!(found, open.to_vec());
        assert_eq!(scanner.progress().scan_count(), 12);
    }

    #[tokio::test]
    async fn test_scan_never_exceeds_max_probes() {
        let probe = StubProbe::new([]);
        let scanner = PortScanner::new(
            probe.clone(),
            vec![Ipv4Addr::new(10, 0, 0, 1)],
            PortRange::parse("1000-1500").unwrap(),
            1,
            7,
            100,
            Duration::from_secs(1),
        );
        scanner.scan(&CancellationToken::new()).await;
        assert!(probe.peak.load(Ordering::SeqCst) <= 7);
    }

    #[tokio::test]
    async fn test_scan_winds_down_at_min_percent() {
        let probe = StubProbe::new([]);
        let scanner = PortScanner::new(
            probe,
            vec![Ipv4Addr::new(10, 0, 0, 1)],
            PortRange::parse("1000-1999").unwrap(),
            1,
            8,
            40,
            Duration::from_secs(1),
        );
        scanner.scan(&CancellationToken::new()).await;
        assert_eq!(scanner.progress().scan_count(), 400);
    }

    #[tokio::test]
    async fn test_scan_stops_on_cancellation() {
        let probe = StubProbe::new([]);
        let scanner = PortScanner::new(
            probe,
            vec![Ipv4Addr::new(10, 0, 0, 1)],
            PortRange::all(),
            1,
            2,
            100,
            Duration::from_secs(1),
        );
        let ct = CancellationToken::new();
        ct.cancel();
        let found = scanner.scan(&ct).await;
        assert!(found.is_empty());
        assert_eq!(scanner.progress().scan_count(), 0);
    }

    #[test]
    fn test_wind_down_threshold() {
        assert_eq!(wind_down_threshold(1000, 100), usize::MAX);
        assert_eq!(wind_down_threshold(1000, 40), 400);
        assert_eq!(wind_down_threshold(999, 50), 500);
        assert_eq!(wind_down_threshold(0, 50), 0);
    }
}
