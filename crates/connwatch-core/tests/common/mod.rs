//! Test doubles and common utilities for architecture contract tests
//!
//! These doubles script what the monitor observes (probe verdicts, adapter
//! events, interface snapshots) and count how the monitor uses them.

#![allow(dead_code)]

use connwatch_core::error::Result;
use connwatch_core::traits::{
    ConnectivityProbe, DnsAttempt, EndpointOutcome, InterfaceSnapshot, InterfaceSource,
    PlatformAdapter, PlatformEvent, ProbeEvidence, ProbeResult,
};
use connwatch_core::{ConnectivityMonitor, MonitorConfig, MonitorEvent};
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::Stream;

/// A probe whose verdict the test controls
pub struct ScriptedProbe {
    online: AtomicBool,
    /// (confidence, latency in ms) reported while online
    quality: Mutex<(f64, f64)>,
    delay: Mutex<Duration>,
    /// One per comprehensive check (counted in `multi_endpoint_check`)
    check_count: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(online),
            quality: Mutex::new((0.9, 50.0)),
            delay: Mutex::new(Duration::ZERO),
            check_count: AtomicUsize::new(0),
        })
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_quality(&self, confidence: f64, latency_ms: f64) {
        *self.quality.lock().unwrap() = (confidence, latency_ms);
    }

    /// Delay every check by `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn check_count(&self) -> usize {
        self.check_count.load(Ordering::SeqCst)
    }

    async fn pause(&self) -> bool {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.online.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ConnectivityProbe for ScriptedProbe {
    async fn basic_check(&self) -> Result<ProbeResult> {
        let online = self.pause().await;
        let latency = self.quality.lock().unwrap().1;
        Ok(if online {
            ProbeResult::basic("https://probe.test/generate_204", Some(204), Some(latency), None)
        } else {
            ProbeResult::basic(
                "https://probe.test/generate_204",
                None,
                None,
                Some("network unreachable".to_string()),
            )
        })
    }

    async fn dns_check(&self) -> Result<ProbeResult> {
        let online = self.pause().await;
        Ok(ProbeResult::from_dns_attempts(vec![DnsAttempt {
            domain: "example.com".to_string(),
            resolver: "192.0.2.53:53".parse().unwrap(),
            resolved: online,
            response_time_ms: online.then_some(10.0),
            error: (!online).then(|| "timed out".to_string()),
        }]))
    }

    async fn multi_endpoint_check(&self) -> Result<ProbeResult> {
        self.check_count.fetch_add(1, Ordering::SeqCst);
        let online = self.pause().await;
        let (confidence, latency) = *self.quality.lock().unwrap();

        if !online {
            return Ok(ProbeResult::from_endpoint_outcomes(vec![EndpointOutcome {
                name: "scripted".to_string(),
                weight: 1.0,
                success: false,
                response_time_ms: None,
                error: Some("network unreachable".to_string()),
            }]));
        }
        Ok(ProbeResult {
            success: confidence > 0.3,
            confidence: Some(confidence),
            response_time_ms: Some(latency),
            evidence: ProbeEvidence::MultiEndpoint {
                outcomes: Vec::new(),
            },
        })
    }

    fn probe_name(&self) -> &'static str {
        "scripted"
    }
}

/// A platform adapter that emits events on demand
pub struct ControlledAdapter {
    /// Sender for the test to push events
    test_tx: mpsc::UnboundedSender<PlatformEvent>,
    /// Receiver handed to the monitor by start()
    engine_rx: Mutex<Option<mpsc::UnboundedReceiver<PlatformEvent>>>,
    start_count: AtomicUsize,
    stop_count: AtomicUsize,
}

impl ControlledAdapter {
    pub fn new() -> Arc<Self> {
        let (test_tx, engine_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            test_tx,
            engine_rx: Mutex::new(Some(engine_rx)),
            start_count: AtomicUsize::new(0),
            stop_count: AtomicUsize::new(0),
        })
    }

    /// Push an event into the monitor's adapter stream
    pub fn emit(&self, event: PlatformEvent) {
        let _ = self.test_tx.send(event);
    }

    pub fn start_count(&self) -> usize {
        self.start_count.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stop_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PlatformAdapter for ControlledAdapter {
    fn name(&self) -> &'static str {
        "controlled"
    }

    fn start(&self) -> Pin<Box<dyn Stream<Item = PlatformEvent> + Send + 'static>> {
        self.start_count.fetch_add(1, Ordering::SeqCst);

        let rx = self
            .engine_rx
            .lock()
            .unwrap()
            .take()
            .expect("start() can only be called once");
        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }

    async fn stop(&self) {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// An interface source returning whatever the test last set
pub struct ScriptedInterfaceSource {
    current: Mutex<InterfaceSnapshot>,
    snapshot_count: AtomicUsize,
}

impl ScriptedInterfaceSource {
    pub fn new(initial: InterfaceSnapshot) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(initial),
            snapshot_count: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, snapshot: InterfaceSnapshot) {
        *self.current.lock().unwrap() = snapshot;
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshot_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl InterfaceSource for ScriptedInterfaceSource {
    async fn snapshot(&self) -> Result<InterfaceSnapshot> {
        self.snapshot_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.current.lock().unwrap().clone())
    }
}

/// Build a snapshot from `(name, [addresses])` pairs
pub fn snapshot(entries: &[(&str, &[&str])]) -> InterfaceSnapshot {
    entries
        .iter()
        .map(|(name, addrs)| {
            let addrs: Vec<IpAddr> = addrs.iter().map(|a| a.parse().unwrap()).collect();
            (name.to_string(), addrs)
        })
        .collect()
}

/// A host with one wired interface
pub fn wired_snapshot() -> InterfaceSnapshot {
    snapshot(&[
        ("lo", &["127.0.0.1", "::1"]),
        ("eth0", &["192.168.1.20", "fe80::1c2b:3aff:fe4d:5e6f"]),
    ])
}

/// Short intervals so contracts finish quickly
///
/// The periodic connectivity loop is pushed out of the way so every check a
/// test observes was caused by the signal under test.
pub fn fast_config() -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.engine.interface_poll_interval_ms = 20;
    config.engine.connectivity_interval_secs = 3600;
    config.engine.debounce_ms = 50;
    config.engine.vpn_grace_period_ms = 300;
    config.probes.comprehensive_timeout_ms = 2000;
    config
}

pub fn build_monitor(
    config: MonitorConfig,
    probe: &Arc<ScriptedProbe>,
    adapter: &Arc<ControlledAdapter>,
    source: &Arc<ScriptedInterfaceSource>,
) -> ConnectivityMonitor {
    ConnectivityMonitor::new(config, probe.clone(), adapter.clone(), source.clone())
        .expect("monitor construction succeeds")
}

/// Everything currently buffered on a subscription
pub fn drain(rx: &mut broadcast::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return events,
        }
    }
}

pub fn status_changes(events: &[MonitorEvent]) -> Vec<(bool, bool)> {
    events
        .iter()
        .filter_map(|e| match e {
            MonitorEvent::StatusChange {
                was_online,
                is_online,
                ..
            } => Some((*was_online, *is_online)),
            _ => None,
        })
        .collect()
}

pub fn vpn_changes(events: &[MonitorEvent]) -> Vec<(bool, bool, Option<String>)> {
    events
        .iter()
        .filter_map(|e| match e {
            MonitorEvent::VpnChange {
                active,
                was_active,
                interface_name,
                ..
            } => Some((*active, *was_active, interface_name.clone())),
            _ => None,
        })
        .collect()
}

pub async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
