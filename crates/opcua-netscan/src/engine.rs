// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery orchestration.
//!
//! The engine owns the continuous scan loop, the one-shot request path and
//! the rolling result cache. Mode and configuration transitions are
//! serialized under the state mutex: a setter stops any running continuous
//! scan, waits for it to unwind, and starts a fresh one unless the new mode
//! is off. The loop itself never holds the state mutex across I/O; the
//! cache has its own short-lived lock for the same reason.
//!
//! Pass-level failures are logged and the loop keeps going; only
//! cancellation terminates it. That is a deliberate keep-trying policy for
//! a long-lived background service.

use crate::config::{DiscoveryConfig, DiscoveryMode};
use crate::model::{now_millis, ApplicationRegistration, Identity};
use crate::probe::{LivenessProber, ServerProber};
use crate::publisher::{self, EventSink};
use crate::request::DiscoveryRequest;
use crate::resolver::{self, EndpointDiscovery, EndpointResolver};
use crate::scanner::{Cancelled, NetworkScanner, PortScanner, ScanProgress};
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Capacity of the rolling per-pass result cache.
const CACHE_CAPACITY: usize = 10;

/// Delay before the first continuous pass, letting surrounding
/// infrastructure settle after startup. First activation only.
const SETUP_DELAY: Duration = Duration::from_secs(10);

/// Cadence of sweep progress log lines.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(3);

/// Best-effort cancellation of a named outstanding request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryCancel {
    pub id: Uuid,
}

/// Engine errors surfaced synchronously to callers.
#[derive(Debug, Clone)]
pub enum EngineError {
    /// The bounded task scheduler had no capacity for a one-shot request.
    ResourceExhausted,
    /// The request was rejected before scheduling.
    InvalidRequest(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResourceExhausted => write!(f, "Failed to schedule discovery task"),
            Self::InvalidRequest(s) => write!(f, "Invalid request: {}", s),
        }
    }
}

impl std::error::Error for EngineError {}

/// Collaborators wired into the engine.
pub struct EngineServices {
    pub client: Arc<dyn EndpointDiscovery>,
    pub sink: Arc<dyn EventSink>,
    pub scheduler: Arc<dyn crate::scheduler::TaskScheduler>,
    pub liveness_prober: Arc<dyn LivenessProber>,
    pub server_prober: Arc<dyn ServerProber>,
    pub identity: Identity,
}

/// The discovery engine.
#[derive(Clone)]
pub struct DiscoveryEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    resolver: EndpointResolver,
    sink: Arc<dyn EventSink>,
    scheduler: Arc<dyn crate::scheduler::TaskScheduler>,
    liveness_prober: Arc<dyn LivenessProber>,
    server_prober: Arc<dyn ServerProber>,
    state: Mutex<EngineState>,
    cache: StdMutex<RollingCache>,
}

struct EngineState {
    /// Template request rebuilt on every mode or configuration change.
    request: DiscoveryRequest,
    /// Running continuous scan, if any.
    run: Option<RunHandle>,
    /// Consumed by the first continuous activation.
    setup_delay: Option<Duration>,
    /// Cancellation tokens of outstanding one-shot requests by id.
    pending: HashMap<Uuid, CancellationToken>,
}

struct RunHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl DiscoveryEngine {
    /// Create an engine in the given mode. No scan starts until
    /// [`DiscoveryEngine::scan`] is called or the mode is set.
    pub fn new(services: EngineServices, mode: DiscoveryMode, config: DiscoveryConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                resolver: EndpointResolver::new(services.client, services.identity),
                sink: services.sink,
                scheduler: services.scheduler,
                liveness_prober: services.liveness_prober,
                server_prober: services.server_prober,
                state: Mutex::new(EngineState {
                    request: DiscoveryRequest::new(mode, config),
                    run: None,
                    setup_delay: Some(SETUP_DELAY),
                    pending: HashMap::new(),
                }),
                cache: StdMutex::new(RollingCache::new(CACHE_CAPACITY)),
            }),
        }
    }

    /// Current discovery mode.
    pub async fn mode(&self) -> DiscoveryMode {
        self.inner.state.lock().await.request.mode
    }

    /// Set the discovery mode, stopping any running continuous scan and
    /// restarting per the new mode.
    pub async fn set_mode(&self, mode: DiscoveryMode) {
        let mut state = self.inner.state.lock().await;
        let config = state.request.config.clone();
        state.request = DiscoveryRequest::new(mode, config);
        self.restart_locked(&mut state).await;
    }

    /// Current configuration.
    pub async fn configuration(&self) -> DiscoveryConfig {
        self.inner.state.lock().await.request.config.clone()
    }

    /// Set the configuration, stopping any running continuous scan and
    /// restarting per the current mode.
    pub async fn set_configuration(&self, config: DiscoveryConfig) {
        let mut state = self.inner.state.lock().await;
        let mode = state.request.mode;
        state.request = DiscoveryRequest::new(mode, config);
        self.restart_locked(&mut state).await;
    }

    /// (Re)start continuous scanning per the current mode and configuration.
    pub async fn scan(&self) {
        let mut state = self.inner.state.lock().await;
        self.restart_locked(&mut state).await;
    }

    /// Stop continuous scanning.
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        self.stop_locked(&mut state).await;
    }

    /// Whether a continuous scan loop is currently running.
    pub async fn is_scanning(&self) -> bool {
        self.inner
            .state
            .lock()
            .await
            .run
            .as_ref()
            .map(|run| !run.handle.is_finished())
            .unwrap_or(false)
    }

    /// Schedule a one-shot discovery pass.
    ///
    /// Fails with [`EngineError::ResourceExhausted`] when the bounded task
    /// scheduler has no capacity; the request is not silently dropped.
    pub async fn discover(&self, request: DiscoveryRequest) -> Result<(), EngineError> {
        let id = request.id;
        let cancel = CancellationToken::new();
        {
            let mut state = self.inner.state.lock().await;
            state.pending.insert(id, cancel.clone());
        }
        let inner = self.inner.clone();
        let scheduled = self.inner.scheduler.try_schedule(Box::pin(async move {
            run_once(&inner, &request, &cancel).await;
            inner.state.lock().await.pending.remove(&request.id);
        }));
        if scheduled {
            Ok(())
        } else {
            self.inner.state.lock().await.pending.remove(&id);
            error!("discovery request {} not scheduled, no capacity", id);
            Err(EngineError::ResourceExhausted)
        }
    }

    /// Best-effort cancellation of an outstanding one-shot request.
    pub async fn cancel(&self, request: &DiscoveryCancel) {
        if let Some(token) = self.inner.state.lock().await.pending.get(&request.id) {
            info!("cancelling discovery request {}", request.id);
            token.cancel();
        }
    }

    /// Snapshot of the rolling result cache, newest pass last.
    pub async fn snapshot(&self) -> Vec<(u64, Vec<ApplicationRegistration>)> {
        self.inner.cache().snapshot()
    }

    async fn restart_locked(&self, state: &mut EngineState) {
        self.stop_locked(state).await;
        if state.request.mode == DiscoveryMode::Off {
            return;
        }
        let cancel = CancellationToken::new();
        let request = state.request.renewed();
        let delay = state.setup_delay.take();
        let inner = self.inner.clone();
        let token = cancel.clone();
        let handle = self.inner.scheduler.run(Box::pin(async move {
            run_continuously(&inner, request, delay, token).await;
        }));
        state.run = Some(RunHandle { cancel, handle });
    }

    async fn stop_locked(&self, state: &mut EngineState) {
        let Some(run) = state.run.take() else {
            return;
        };
        run.cancel.cancel();
        if let Err(e) = run.handle.await {
            if !e.is_cancelled() {
                error!("unexpected error stopping discovery run: {}", e);
            }
        }
        self.inner.cache().clear();
    }
}

impl EngineInner {
    fn cache(&self) -> std::sync::MutexGuard<'_, RollingCache> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// One-shot discovery pass.
async fn run_once(inner: &EngineInner, request: &DiscoveryRequest, ct: &CancellationToken) {
    debug!("{}: processing discovery request...", request.id);
    match discover_servers(inner, request, ct).await {
        Ok(discovered) => {
            if ct.is_cancelled() {
                debug!("{}: discovery operation cancelled", request.id);
                return;
            }
            let timestamp = now_millis();
            match publisher::publish(
                inner.sink.as_ref(),
                &discovered,
                timestamp,
                request,
                None,
            )
            .await
            {
                Ok(()) => debug!("{}: discovery operation completed", request.id),
                Err(e) => error!("{}: failed to upload discovery results: {}", request.id, e),
            }
        }
        Err(Cancelled) => debug!("{}: discovery operation cancelled", request.id),
    }
}

/// Continuous discovery loop. Runs until the token fires.
async fn run_continuously(
    inner: &EngineInner,
    template: DiscoveryRequest,
    delay: Option<Duration>,
    ct: CancellationToken,
) {
    if let Some(delay) = delay {
        debug!("delaying discovery start for {:?}...", delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = ct.cancelled() => {
                debug!("cancelled discovery start");
                return;
            }
        }
    }

    info!("starting {} discovery...", template.mode);
    let mut diagnostics: Option<serde_json::Value> = None;
    while !ct.is_cancelled() {
        let request = template.renewed();
        match discover_servers(inner, &request, &ct).await {
            Ok(discovered) => {
                let timestamp = now_millis();
                inner.cache().insert(timestamp, discovered.clone());
                if ct.is_cancelled() {
                    break;
                }
                match publisher::publish(
                    inner.sink.as_ref(),
                    &discovered,
                    timestamp,
                    &request,
                    diagnostics.take(),
                )
                .await
                {
                    Ok(()) => debug!("{}: discovery pass completed", request.id),
                    Err(e) => {
                        error!("{}: failed to upload discovery results: {}", request.id, e);
                        diagnostics = Some(serde_json::Value::String(e.to_string()));
                    }
                }
            }
            Err(Cancelled) => break,
        }

        // Keep the idle delay even after a failed pass so errors cannot
        // turn into a retry storm.
        let idle = request.config.idle_time_between_scans();
        if !idle.is_zero() {
            debug!("idle for {:?}...", idle);
            tokio::select! {
                _ = tokio::time::sleep(idle) => {}
                _ = ct.cancelled() => break,
            }
        }
    }
    info!("cancelled discovery");
}

/// Run one full discovery pass: sweep, probe, resolve, merge.
async fn discover_servers(
    inner: &EngineInner,
    request: &DiscoveryRequest,
    ct: &CancellationToken,
) -> Result<Vec<ApplicationRegistration>, Cancelled> {
    let mut candidates = resolver::resolve_discovery_urls(&request.discovery_urls).await;
    if request.mode == DiscoveryMode::Off {
        // Explicit urls only; an empty url list is an empty result, not an
        // empty sweep.
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        return inner.resolver.discover_servers(request, candidates, ct).await;
    }

    info!("{}: start {} discovery run...", request.id, request.mode);
    let watch = Instant::now();
    let config = &request.config;
    let local = request.mode == DiscoveryMode::Local;

    let netscan = NetworkScanner::new(
        inner.liveness_prober.clone(),
        local,
        request.address_ranges.clone().unwrap_or_default(),
        config.min_network_probes,
        config.max_network_probes,
        config.network_probe_timeout(),
    );
    let progress = spawn_progress_logger(
        "addresses",
        request.id,
        netscan.progress(),
        request.total_addresses(),
    );
    let mut addresses = netscan.scan(ct).await;
    progress.abort();
    info!(
        "{}: found {} addresses took {:?} ({} scanned)",
        request.id,
        addresses.len(),
        watch.elapsed(),
        netscan.progress().scan_count()
    );
    if ct.is_cancelled() {
        return Err(Cancelled);
    }
    if addresses.is_empty() {
        return Ok(Vec::new());
    }
    let loopback = Ipv4Addr::LOCALHOST;
    if !addresses.contains(&loopback) {
        addresses.push(loopback);
    }

    let portscan = PortScanner::new(
        inner.server_prober.clone(),
        addresses,
        request.port_ranges.clone(),
        config.min_port_probes,
        config.max_port_probes,
        config.min_port_probes_percent,
        config.port_probe_timeout(),
    );
    let progress = spawn_progress_logger("ports", request.id, portscan.progress(), portscan.total());
    let ports = portscan.scan(ct).await;
    progress.abort();
    info!(
        "{}: found {} ports on servers took {:?} ({} scanned)",
        request.id,
        ports.len(),
        watch.elapsed(),
        portscan.progress().scan_count()
    );
    if ct.is_cancelled() {
        return Err(Cancelled);
    }
    if ports.is_empty() {
        return Ok(Vec::new());
    }

    for endpoint in ports {
        candidates.insert(endpoint, format!("opc.tcp://{}", endpoint));
    }

    let discovered = inner.resolver.discover_servers(request, candidates, ct).await?;
    info!(
        "{}: discovery took {:?} and found {} servers",
        request.id,
        watch.elapsed(),
        discovered.len()
    );
    Ok(discovered)
}

/// Periodically log sweep progress until aborted.
fn spawn_progress_logger(
    what: &'static str,
    request_id: Uuid,
    progress: Arc<ScanProgress>,
    total: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PROGRESS_INTERVAL);
        interval.tick().await; // first tick fires immediately
        loop {
            interval.tick().await;
            info!(
                "{}: {} of {} {} scanned - {} found ({} probes active)...",
                request_id,
                progress.scan_count(),
                total,
                what,
                progress.found_count(),
                progress.active_probes()
            );
        }
    })
}

/// Time-ordered bounded history of recent scan passes.
struct RollingCache {
    entries: BTreeMap<u64, Vec<ApplicationRegistration>>,
    capacity: usize,
}

impl RollingCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity,
        }
    }

    /// Insert a pass result, evicting the oldest entry when over capacity.
    fn insert(&mut self, timestamp: u64, discovered: Vec<ApplicationRegistration>) {
        self.entries.insert(timestamp, discovered);
        while self.entries.len() > self.capacity {
            self.entries.pop_first();
        }
    }

    fn snapshot(&self) -> Vec<(u64, Vec<ApplicationRegistration>)> {
        self.entries
            .iter()
            .map(|(&ts, items)| (ts, items.clone()))
            .collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}
