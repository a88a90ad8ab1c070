// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Address sweep driver.

use super::{probe_concurrency, ScanProgress};
use crate::probe::LivenessProber;
use crate::range::AddressRange;
use crate::request::local_interface_addresses;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Sweeps an address space with a bounded number of concurrent liveness
/// probes, collecting the addresses that respond.
pub struct NetworkScanner {
    prober: Arc<dyn LivenessProber>,
    /// Probe only the local machine's own addresses, bypassing ranges.
    local: bool,
    ranges: Vec<AddressRange>,
    min_probes: usize,
    max_probes: usize,
    probe_timeout: Duration,
    progress: Arc<ScanProgress>,
}

impl NetworkScanner {
    pub fn new(
        prober: Arc<dyn LivenessProber>,
        local: bool,
        ranges: Vec<AddressRange>,
        min_probes: usize,
        max_probes: usize,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            prober,
            local,
            ranges,
            min_probes,
            max_probes,
            probe_timeout,
            progress: ScanProgress::new(),
        }
    }

    /// Progress counters, pollable while the sweep runs.
    pub fn progress(&self) -> Arc<ScanProgress> {
        self.progress.clone()
    }

    /// Run the sweep to completion or cancellation.
    ///
    /// On cancellation no further probes are launched; in-flight probes
    /// finish or time out and the addresses collected so far are returned.
    pub async fn scan(&self, ct: &CancellationToken) -> Vec<Ipv4Addr> {
        if self.local {
            let targets = local_interface_addresses();
            debug!("local sweep over {} own addresses", targets.len());
            let total = targets.len();
            return self.sweep(targets.into_iter(), total, ct).await;
        }
        let total = AddressRange::total(&self.ranges);
        debug!(
            "network sweep over {} addresses in {} ranges",
            total,
            self.ranges.len()
        );
        let candidates = self.ranges.iter().flat_map(AddressRange::iter);
        self.sweep(candidates, total, ct).await
    }

    async fn sweep(
        &self,
        candidates: impl Iterator<Item = Ipv4Addr>,
        total: usize,
        ct: &CancellationToken,
    ) -> Vec<Ipv4Addr> {
        let concurrency = probe_concurrency(total, self.min_probes, self.max_probes);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel();

        for target in candidates {
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
                let alive = tokio::time::timeout(probe_timeout, prober.probe(target, probe_timeout))
                    .await
                    .unwrap_or(false);
                progress.probe_finished(alive);
                if alive {
                    let _ = tx.send(target);
                }
                drop(permit);
            });
        }

        // Each probe task holds a sender clone; the channel drains once all
        // in-flight probes have unwound.
        drop(tx);
        let mut found = Vec::new();
        while let Some(address) = rx.recv().await {
            found.push(address);
        }
        found.sort_unstable();
        found
    }
}
