//! Connectivity monitor
//!
//! The ConnectivityMonitor is responsible for:
//! - Polling interface snapshots and classifying changes
//! - Consuming raw platform adapter events
//! - Debouncing significant signals into comprehensive checks
//! - Owning the canonical `NetworkState` and publishing transitions
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  ┌───────────────────┐  ┌──────────────────┐
//! │ InterfaceSource  │  │  PlatformAdapter  │  │  periodic timer  │
//! │ (1 s snapshots)  │  │  (native events)  │  │      (30 s)      │
//! └──────────────────┘  └───────────────────┘  └──────────────────┘
//!          │ significant           │ network change        │
//!          └───────────┬───────────┘                       │
//!                      ▼                                   │
//!              ┌──────────────┐                            │
//!              │   debounce   │                            │
//!              └──────────────┘                            │
//!                      │                                   │
//!                      ▼                                   ▼
//!              ┌──────────────────────────────────────────────┐
//!              │  comprehensive check (basic + DNS + multi)   │
//!              └──────────────────────────────────────────────┘
//!                      │
//!                      ▼
//!              ┌──────────────┐        ┌─────────────┐
//!              │ NetworkState │──────▶ │   Events    │
//!              │ (one writer) │        │ (broadcast) │
//!              └──────────────┘        └─────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. A signal arrives (interface change, adapter event, VPN transition, timer)
//! 2. Significant signals restart the debounce window
//! 3. When the window stays quiet, one comprehensive check runs
//! 4. Results are written to the state under the update lock
//! 5. Events are emitted for actual transitions only

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::interfaces::{InterfaceChange, InterfaceDifferencer};
use crate::probe::{quality_for, run_comprehensive_check};
use crate::state::{NetworkState, StateChangeEntry, StateChangeHistory};
use crate::traits::{
    ConnectivityProbe, InterfaceSource, NetworkChangeKind, PlatformAdapter, PlatformEvent,
    ProbeResults, VpnSignal,
};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{OnceCell, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

type PlatformEventStream = Pin<Box<dyn Stream<Item = PlatformEvent> + Send + 'static>>;

/// Events published by the ConnectivityMonitor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// Monitor finished its baseline and is watching
    Started { state: NetworkState },

    /// Online/offline verdict flipped
    StatusChange {
        was_online: bool,
        is_online: bool,
        state: NetworkState,
    },

    /// Interfaces changed, or an adapter reported a native change
    NetworkChange {
        kind: NetworkChangeKind,
        detail: Option<String>,
        changes: Vec<InterfaceChange>,
        state: NetworkState,
    },

    /// VPN presence flipped
    VpnChange {
        active: bool,
        was_active: bool,
        interface_name: Option<String>,
        state: NetworkState,
    },

    /// A comprehensive check changed the quality class
    ConnectivityChange {
        was_online: bool,
        is_online: bool,
        results: ProbeResults,
        state: NetworkState,
    },

    /// Monitor stopped
    Stopped { reason: String },
}

/// Connectivity and quality monitor
///
/// One explicit object per monitored host. Create it with
/// [`ConnectivityMonitor::new()`], start it with
/// [`ConnectivityMonitor::initialize()`] and tear it down with
/// [`ConnectivityMonitor::destroy()`].
///
/// ## Single Writer
///
/// Every mutation of the state, and the emission of the events describing
/// it, happens under one async lock. Readers get clones via
/// [`ConnectivityMonitor::state()`] and never observe a half-applied update.
///
/// ## Failure Containment
///
/// Background paths never return errors. Probe failures become evidence,
/// adapter failures are logged by the adapter, and a failed enumeration keeps
/// the last known snapshot.
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    config: MonitorConfig,
    probe: Arc<dyn ConnectivityProbe>,
    adapter: Arc<dyn PlatformAdapter>,
    differencer: tokio::sync::Mutex<InterfaceDifferencer>,

    /// Canonical state; written only while `update_lock` is held
    state: RwLock<NetworkState>,
    history: Mutex<StateChangeHistory>,

    /// Serializes state mutation and the emission of its events
    update_lock: tokio::sync::Mutex<()>,

    /// Taken on destroy so subscribers see the channel close
    event_tx: Mutex<Option<broadcast::Sender<MonitorEvent>>>,

    debounce_tx: mpsc::UnboundedSender<()>,
    debounce_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,

    /// Start of the VPN grace window
    started_at: Mutex<Instant>,
    /// Set once by the first initialize()
    baseline: OnceCell<NetworkState>,
    stopped: AtomicBool,
    checks_run: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    /// Create a new monitor
    ///
    /// # Parameters
    ///
    /// - `config`: Monitor configuration (validated here)
    /// - `probe`: Connectivity probe implementation
    /// - `adapter`: Platform adapter implementation
    /// - `interfaces`: Interface enumeration implementation
    ///
    /// Nothing runs until [`ConnectivityMonitor::initialize()`] is called.
    pub fn new(
        config: MonitorConfig,
        probe: Arc<dyn ConnectivityProbe>,
        adapter: Arc<dyn PlatformAdapter>,
        interfaces: Arc<dyn InterfaceSource>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(config.engine.event_channel_capacity);
        let (debounce_tx, debounce_rx) = mpsc::unbounded_channel();
        let history = StateChangeHistory::new(config.engine.history_capacity);

        let inner = Inner {
            config,
            probe,
            adapter,
            differencer: tokio::sync::Mutex::new(InterfaceDifferencer::new(interfaces)),
            state: RwLock::new(NetworkState::initial()),
            history: Mutex::new(history),
            update_lock: tokio::sync::Mutex::new(()),
            event_tx: Mutex::new(Some(event_tx)),
            debounce_tx,
            debounce_rx: Mutex::new(Some(debounce_rx)),
            started_at: Mutex::new(Instant::now()),
            baseline: OnceCell::new(),
            stopped: AtomicBool::new(false),
            checks_run: AtomicU64::new(0),
            tasks: Mutex::new(Vec::new()),
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Start the adapter, establish the baseline and start the loops
    ///
    /// Resolves once the baseline comprehensive check has completed, with the
    /// resulting state. Concurrent callers wait for that same baseline; calls
    /// made after it return the current state.
    pub async fn initialize(&self) -> NetworkState {
        let inner = &self.inner;
        if inner.stopped.load(Ordering::SeqCst) || inner.baseline.initialized() {
            return self.state();
        }
        inner.baseline.get_or_init(|| self.start()).await.clone()
    }

    async fn start(&self) -> NetworkState {
        let inner = &self.inner;
        info!(
            "Starting connectivity monitor (adapter: {}, probe: {})",
            inner.adapter.name(),
            inner.probe.probe_name()
        );

        let events = inner.adapter.start();
        inner.establish_interface_baseline().await;
        let state = inner.run_check("baseline").await;

        if inner.stopped.load(Ordering::SeqCst) {
            return state;
        }
        info!(
            "Baseline: online={} quality={} vpn={}",
            state.is_online, state.network_quality, state.vpn_active
        );
        inner.emit(MonitorEvent::Started {
            state: state.clone(),
        });

        self.spawn_loops(events);
        state
    }

    fn spawn_loops(&self, events: PlatformEventStream) {
        let inner = &self.inner;
        // Adapter events queued during the baseline are judged from here
        *inner.started_at.lock() = Instant::now();
        let mut handles = vec![
            tokio::spawn(Arc::clone(inner).interface_loop()),
            tokio::spawn(Arc::clone(inner).connectivity_loop()),
            tokio::spawn(Arc::clone(inner).adapter_loop(events)),
        ];
        if let Some(rx) = inner.debounce_rx.lock().take() {
            handles.push(tokio::spawn(Arc::clone(inner).debounce_loop(rx)));
        }
        inner.tasks.lock().extend(handles);
    }

    /// Copy of the current state
    pub fn state(&self) -> NetworkState {
        self.inner.state.read().clone()
    }

    /// Run a comprehensive check now and apply its results
    pub async fn force_check(&self) -> NetworkState {
        self.inner.run_check("forced").await
    }

    /// Apply the results of a comprehensive check
    ///
    /// Results arriving after [`ConnectivityMonitor::destroy()`] are discarded.
    pub async fn update_state_from_results(&self, results: ProbeResults) -> NetworkState {
        self.inner.update_state_from_results(results).await
    }

    /// Apply a VPN presence signal
    ///
    /// Returns whether the signal flipped `vpn_active`.
    pub async fn handle_vpn_state_change(&self, signal: VpnSignal) -> bool {
        self.inner.handle_vpn_state_change(signal).await
    }

    /// Subscribe to monitor events
    ///
    /// After [`ConnectivityMonitor::destroy()`] the returned receiver is
    /// already closed.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        match self.inner.event_tx.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Recent online/offline transitions, oldest first
    pub fn history(&self) -> Vec<StateChangeEntry> {
        self.inner.history.lock().entries()
    }

    /// Whether the connection has been flipping repeatedly in the last minute
    pub fn is_flapping(&self) -> bool {
        self.inner.history.lock().is_flapping(Utc::now())
    }

    /// Number of comprehensive checks started so far
    pub fn checks_run(&self) -> u64 {
        self.inner.checks_run.load(Ordering::SeqCst)
    }

    /// Whether [`ConnectivityMonitor::destroy()`] has been called
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Cancel every task, stop the adapter and detach subscribers
    pub async fn destroy(&self) {
        let inner = &self.inner;
        if inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Stopping connectivity monitor");

        let tasks = std::mem::take(&mut *inner.tasks.lock());
        for task in &tasks {
            task.abort();
        }
        inner.adapter.stop().await;
        for task in tasks {
            let _ = task.await;
        }

        // Wait out any update that began before the flag flipped
        let _guard = inner.update_lock.lock().await;
        inner.emit(MonitorEvent::Stopped {
            reason: "destroyed".to_string(),
        });
        inner.event_tx.lock().take();
        debug!("Connectivity monitor stopped");
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Inner {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Emit an event to current subscribers
    fn emit(&self, event: MonitorEvent) {
        if let Some(tx) = self.event_tx.lock().as_ref() {
            // Err means nobody is subscribed right now
            let _ = tx.send(event);
        }
    }

    fn trigger_debounce(&self) {
        if self.debounce_tx.send(()).is_err() {
            debug!("Debounce worker gone, dropping trigger");
        }
    }

    /// Take the first snapshot and adopt its interfaces and VPN presence
    async fn establish_interface_baseline(&self) {
        let (snapshot, vpn_interface) = {
            let mut differencer = self.differencer.lock().await;
            differencer.check_interfaces().await;
            (
                differencer.snapshot().cloned(),
                differencer.vpn_interface().map(str::to_string),
            )
        };

        let _guard = self.update_lock.lock().await;
        let mut state = self.state.write();
        if let Some(snapshot) = snapshot {
            debug!("Interface baseline: {} interface(s)", snapshot.len());
            state.interfaces = snapshot;
        }
        if let Some(name) = vpn_interface {
            info!("VPN interface present at start: {}", name);
            state.vpn_active = true;
            state.vpn_interface_name = Some(name);
        }
    }

    async fn interface_loop(self: Arc<Self>) {
        let period = self.config.engine.interface_poll_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.poll_interfaces().await;
        }
    }

    async fn poll_interfaces(self: &Arc<Self>) {
        let (changes, snapshot, vpn_signal) = {
            let mut differencer = self.differencer.lock().await;
            let changes = differencer.check_interfaces().await;
            (
                changes,
                differencer.snapshot().cloned(),
                differencer.take_vpn_signal(),
            )
        };

        {
            let _guard = self.update_lock.lock().await;
            if self.is_stopped() {
                return;
            }
            let state = {
                let mut state = self.state.write();
                if let Some(snapshot) = snapshot
                    && state.interfaces != snapshot
                {
                    state.interfaces = snapshot;
                }
                state.clone()
            };

            if !changes.is_empty() {
                for change in &changes {
                    debug!(
                        "Interface {} {:?} (significant: {})",
                        change.interface_name, change.kind, change.significant
                    );
                }
                self.emit(MonitorEvent::NetworkChange {
                    kind: NetworkChangeKind::Interface,
                    detail: None,
                    changes: changes.clone(),
                    state,
                });
            }
        }

        // A VPN flip schedules its own check
        let vpn_flipped = match vpn_signal {
            Some(signal) => self.handle_vpn_state_change(signal).await,
            None => false,
        };
        if !vpn_flipped && changes.iter().any(|c| c.significant) {
            self.trigger_debounce();
        }
    }

    async fn connectivity_loop(self: Arc<Self>) {
        let period = self.config.engine.connectivity_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.run_check("periodic").await;
        }
    }

    async fn adapter_loop(self: Arc<Self>, mut events: PlatformEventStream) {
        while let Some(event) = events.next().await {
            if self.is_stopped() {
                return;
            }
            match event {
                PlatformEvent::NetworkChange { kind, detail } => {
                    debug!("Platform {} change: {}", kind, detail);
                    {
                        let _guard = self.update_lock.lock().await;
                        let state = self.state.read().clone();
                        self.emit(MonitorEvent::NetworkChange {
                            kind,
                            detail: Some(detail),
                            changes: Vec::new(),
                            state,
                        });
                    }
                    self.trigger_debounce();
                }
                PlatformEvent::VpnState {
                    active,
                    interface_name,
                } => {
                    self.handle_vpn_state_change(VpnSignal::reported(active, interface_name))
                        .await;
                }
            }
        }
        warn!("Platform adapter {} stream ended", self.adapter.name());
    }

    /// Single-flight debounce: every trigger restarts the quiet window
    async fn debounce_loop(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<()>) {
        let window = self.config.engine.debounce();

        while rx.recv().await.is_some() {
            loop {
                match tokio::time::timeout(window, rx.recv()).await {
                    Ok(Some(())) => continue,
                    Ok(None) => return,
                    Err(_) => break,
                }
            }
            self.run_check("debounced").await;
        }
    }

    async fn run_check(&self, reason: &str) -> NetworkState {
        if self.is_stopped() {
            return self.state.read().clone();
        }
        debug!("Running comprehensive check ({})", reason);
        self.checks_run.fetch_add(1, Ordering::SeqCst);

        let results = run_comprehensive_check(
            Arc::clone(&self.probe),
            self.config.probes.comprehensive_timeout(),
        )
        .await;
        self.update_state_from_results(results).await
    }

    /// Run a check on a tracked task so destroy can cancel it
    fn spawn_check(self: &Arc<Self>, reason: &'static str) {
        if self.is_stopped() {
            return;
        }
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            inner.run_check(reason).await;
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    async fn update_state_from_results(&self, results: ProbeResults) -> NetworkState {
        let _guard = self.update_lock.lock().await;
        if self.is_stopped() {
            debug!("Discarding probe results after stop");
            return self.state.read().clone();
        }

        let is_online = results.basic.success || results.multi_endpoint.success;
        let confidence = results
            .multi_endpoint
            .confidence
            .filter(|c| !c.is_nan())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);
        let quality = quality_for(
            is_online,
            confidence,
            results.multi_endpoint.response_time_ms,
        );
        let now = Utc::now();

        let (previous, state) = {
            let mut state = self.state.write();
            let previous = state.clone();

            state.is_online = is_online;
            state.network_quality = quality;
            state.confidence = confidence;
            state.last_check = Some(now);
            state.consecutive_failures = if is_online {
                0
            } else {
                state.consecutive_failures.saturating_add(1)
            };
            if previous.is_online != is_online {
                state.last_change = Some(now);
            }
            (previous, state.clone())
        };

        let flipped = previous.is_online != is_online;
        if flipped {
            info!(
                "Connectivity {} -> {} (quality: {}, confidence: {:.2})",
                status_label(previous.is_online),
                status_label(is_online),
                quality,
                confidence
            );
            self.history
                .lock()
                .record(previous.is_online, is_online, previous.last_change, now);
            self.emit(MonitorEvent::StatusChange {
                was_online: previous.is_online,
                is_online,
                state: state.clone(),
            });
        } else if !is_online {
            debug!(
                "Still offline ({} consecutive failures)",
                state.consecutive_failures
            );
        }

        if flipped || previous.network_quality != quality {
            if !flipped {
                info!("Quality {} -> {}", previous.network_quality, quality);
            }
            self.emit(MonitorEvent::ConnectivityChange {
                was_online: previous.is_online,
                is_online,
                results,
                state: state.clone(),
            });
        }

        state
    }

    async fn handle_vpn_state_change(self: &Arc<Self>, signal: VpnSignal) -> bool {
        let in_grace = self.started_at.lock().elapsed() < self.config.engine.vpn_grace_period();
        if !signal.active && !signal.corroborated && in_grace {
            if self.state.read().vpn_active {
                info!("Ignoring VPN loss reported during start-up grace period");
            }
            return false;
        }

        let (was_active, state) = {
            let _guard = self.update_lock.lock().await;
            if self.is_stopped() {
                return false;
            }

            let (was_active, state) = {
                let mut state = self.state.write();
                let was_active = state.vpn_active;
                if was_active == signal.active {
                    if signal.active
                        && signal.interface_name.is_some()
                        && state.vpn_interface_name != signal.interface_name
                    {
                        debug!(
                            "VPN interface renamed: {:?} -> {:?}",
                            state.vpn_interface_name, signal.interface_name
                        );
                        state.vpn_interface_name = signal.interface_name.clone();
                    }
                    return false;
                }

                state.vpn_active = signal.active;
                state.vpn_interface_name = if signal.active {
                    signal.interface_name.clone()
                } else {
                    None
                };
                (was_active, state.clone())
            };

            info!(
                "VPN {} ({})",
                if signal.active { "connected" } else { "disconnected" },
                signal.interface_name.as_deref().unwrap_or("unknown interface")
            );
            self.emit(MonitorEvent::VpnChange {
                active: signal.active,
                was_active,
                interface_name: signal.interface_name.clone(),
                state: state.clone(),
            });
            (was_active, state)
        };

        debug!(
            "VPN transition {} -> {}, re-checking connectivity (online: {})",
            was_active, signal.active, state.is_online
        );
        self.spawn_check("vpn-change");
        true
    }
}

fn status_label(online: bool) -> &'static str {
    if online { "online" } else { "offline" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{InterfaceSnapshot, ProbeResult};
    use async_trait::async_trait;
    use tokio_test::{assert_pending, assert_ready, task};

    struct OfflineProbe;

    #[async_trait]
    impl ConnectivityProbe for OfflineProbe {
        async fn basic_check(&self) -> Result<ProbeResult> {
            Ok(ProbeResult::failed("unreachable"))
        }

        async fn dns_check(&self) -> Result<ProbeResult> {
            Ok(ProbeResult::failed("unreachable"))
        }

        async fn multi_endpoint_check(&self) -> Result<ProbeResult> {
            Ok(ProbeResult::failed("unreachable"))
        }

        fn probe_name(&self) -> &'static str {
            "offline"
        }
    }

    struct SilentAdapter;

    #[async_trait]
    impl PlatformAdapter for SilentAdapter {
        fn name(&self) -> &'static str {
            "silent"
        }

        fn start(&self) -> PlatformEventStream {
            Box::pin(tokio_stream::pending::<PlatformEvent>())
        }

        async fn stop(&self) {}
    }

    struct EmptySource;

    #[async_trait]
    impl InterfaceSource for EmptySource {
        async fn snapshot(&self) -> Result<InterfaceSnapshot> {
            Ok(InterfaceSnapshot::new())
        }
    }

    fn monitor() -> ConnectivityMonitor {
        ConnectivityMonitor::new(
            MonitorConfig::default(),
            Arc::new(OfflineProbe),
            Arc::new(SilentAdapter),
            Arc::new(EmptySource),
        )
        .unwrap()
    }

    fn online_results(confidence: f64, latency: f64) -> ProbeResults {
        let mut multi = ProbeResult::failed("unused");
        multi.success = true;
        multi.confidence = Some(confidence);
        multi.response_time_ms = Some(latency);
        ProbeResults {
            basic: ProbeResult::basic("https://example.com", Some(204), Some(latency), None),
            dns: ProbeResult::failed("unused"),
            multi_endpoint: multi,
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = MonitorConfig::default();
        config.engine.event_channel_capacity = 0;
        let result = ConnectivityMonitor::new(
            config,
            Arc::new(OfflineProbe),
            Arc::new(SilentAdapter),
            Arc::new(EmptySource),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_state_starts_pessimistic() {
        let monitor = monitor();
        assert_eq!(monitor.state(), NetworkState::initial());
        assert_eq!(monitor.state(), monitor.state());
    }

    #[tokio::test]
    async fn test_excellent_results() {
        let monitor = monitor();
        let state = monitor
            .update_state_from_results(online_results(0.9, 50.0))
            .await;

        assert!(state.is_online);
        assert_eq!(state.network_quality, crate::NetworkQuality::Excellent);
        assert_eq!(state.confidence, 0.9);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.last_check.is_some());
        assert!(state.last_change.is_some());
    }

    #[tokio::test]
    async fn test_failures_accumulate() {
        let monitor = monitor();
        for expected in 1..=3 {
            let state = monitor
                .update_state_from_results(ProbeResults::all_failed("down"))
                .await;
            assert_eq!(state.consecutive_failures, expected);
            assert!(!state.is_online);
        }
        assert!(monitor.history().is_empty(), "offline -> offline is no flip");

        let state = monitor
            .update_state_from_results(online_results(0.5, 500.0))
            .await;
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(monitor.history().len(), 1);
    }

    #[tokio::test]
    async fn test_quality_change_emits_connectivity_change() {
        let monitor = monitor();
        monitor
            .update_state_from_results(online_results(0.9, 50.0))
            .await;

        let mut rx = monitor.subscribe();
        monitor
            .update_state_from_results(online_results(0.5, 500.0))
            .await;

        match rx.try_recv().unwrap() {
            MonitorEvent::ConnectivityChange {
                was_online,
                is_online,
                state,
                ..
            } => {
                assert!(was_online && is_online);
                assert_eq!(state.network_quality, crate::NetworkQuality::Fair);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err(), "no status change without a flip");
    }

    #[tokio::test]
    async fn test_vpn_grace_ignores_reported_loss() {
        let monitor = monitor();
        assert!(
            monitor
                .handle_vpn_state_change(VpnSignal::observed(true, Some("wg0".to_string())))
                .await
        );
        assert!(
            !monitor
                .handle_vpn_state_change(VpnSignal::reported(false, None))
                .await
        );
        assert!(monitor.state().vpn_active);

        assert!(
            monitor
                .handle_vpn_state_change(VpnSignal::observed(false, Some("wg0".to_string())))
                .await
        );
        assert!(!monitor.state().vpn_active);
        assert_eq!(monitor.state().vpn_interface_name, None);
        monitor.destroy().await;
    }

    #[tokio::test]
    async fn test_destroy_closes_subscribers() {
        let monitor = monitor();
        let mut rx = monitor.subscribe();

        // Nothing published yet
        assert_pending!(task::spawn(rx.recv()).poll());

        monitor.destroy().await;

        let mut recv = task::spawn(rx.recv());
        assert!(matches!(
            assert_ready!(recv.poll()),
            Ok(MonitorEvent::Stopped { .. })
        ));
        drop(recv);
        assert!(matches!(
            assert_ready!(task::spawn(rx.recv()).poll()),
            Err(broadcast::error::RecvError::Closed)
        ));

        let mut late = monitor.subscribe();
        assert!(matches!(
            assert_ready!(task::spawn(late.recv()).poll()),
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[test]
    fn test_event_serialization() {
        let event = MonitorEvent::Stopped {
            reason: "destroyed".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "stopped");
        assert_eq!(event.clone(), event);
    }
}
