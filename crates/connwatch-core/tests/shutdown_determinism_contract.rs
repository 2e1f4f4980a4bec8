//! Architectural Contract Test: Shutdown Determinism
//!
//! This test verifies that destroy() is deterministic and complete.
//!
//! Constraints verified:
//! - The adapter is stopped exactly once
//! - Subscribers receive Stopped and then see the channel close
//! - No background loop runs a check after destroy
//! - Results of a check in flight at destroy time are discarded
//! - destroy() is idempotent and bounded in time
//!
//! If this test fails, someone has added:
//! - Detached background tasks
//! - Tasks that ignore cancellation
//! - State writes that skip the stopped check

mod common;

use common::*;
use connwatch_core::MonitorEvent;
use connwatch_core::traits::{NetworkChangeKind, PlatformEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

#[tokio::test]
async fn destroy_stops_adapter_and_detaches_subscribers() {
    let probe = ScriptedProbe::new(true);
    let adapter = ControlledAdapter::new();
    let source = ScriptedInterfaceSource::new(wired_snapshot());
    let monitor = build_monitor(fast_config(), &probe, &adapter, &source);

    monitor.initialize().await;
    assert_eq!(adapter.start_count(), 1);
    let mut rx = monitor.subscribe();

    let result = tokio::time::timeout(Duration::from_secs(5), monitor.destroy()).await;
    assert!(result.is_ok(), "destroy should complete within 5 seconds");
    assert_eq!(adapter.stop_count(), 1);
    assert!(monitor.is_stopped());

    assert!(matches!(rx.recv().await, Ok(MonitorEvent::Stopped { .. })));
    assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
}

#[tokio::test]
async fn no_checks_after_destroy() {
    let probe = ScriptedProbe::new(true);
    let adapter = ControlledAdapter::new();
    let source = ScriptedInterfaceSource::new(wired_snapshot());
    let monitor = build_monitor(fast_config(), &probe, &adapter, &source);

    monitor.initialize().await;
    monitor.destroy().await;
    let checks = probe.check_count();
    let snapshots = source.snapshot_count();

    // Signals that would normally cause checks
    adapter.emit(PlatformEvent::NetworkChange {
        kind: NetworkChangeKind::Route,
        detail: "default route changed".to_string(),
    });
    adapter.emit(PlatformEvent::VpnState {
        active: true,
        interface_name: Some("wg0".to_string()),
    });
    source.set(snapshot(&[("eth1", &["10.0.0.5"])]));

    sleep_ms(300).await;
    assert_eq!(probe.check_count(), checks, "no probing after destroy");
    assert_eq!(source.snapshot_count(), snapshots, "interface loop stopped");

    // Explicit calls are inert too
    let before = monitor.state();
    let after = monitor.force_check().await;
    assert_eq!(before, after);
    assert_eq!(probe.check_count(), checks);
}

#[tokio::test]
async fn in_flight_results_are_discarded() {
    let probe = ScriptedProbe::new(true);
    let adapter = ControlledAdapter::new();
    let source = ScriptedInterfaceSource::new(wired_snapshot());
    let monitor = Arc::new(build_monitor(fast_config(), &probe, &adapter, &source));

    let baseline = monitor.initialize().await;
    assert!(baseline.is_online);

    probe.set_online(false);
    probe.set_delay(Duration::from_millis(300));
    let in_flight = {
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move { monitor.force_check().await })
    };

    sleep_ms(50).await;
    monitor.destroy().await;

    let returned = in_flight.await.unwrap();
    assert!(returned.is_online, "late offline verdict was not applied");
    assert!(monitor.state().is_online);
    assert_eq!(monitor.state().last_check, baseline.last_check);
}

#[tokio::test]
async fn destroy_is_idempotent() {
    let probe = ScriptedProbe::new(true);
    let adapter = ControlledAdapter::new();
    let source = ScriptedInterfaceSource::new(wired_snapshot());
    let monitor = build_monitor(fast_config(), &probe, &adapter, &source);

    monitor.initialize().await;
    monitor.destroy().await;
    monitor.destroy().await;
    assert_eq!(adapter.stop_count(), 1);

    // A destroyed monitor does not restart
    monitor.initialize().await;
    assert_eq!(adapter.start_count(), 1);
    assert!(matches!(
        monitor.subscribe().recv().await,
        Err(RecvError::Closed)
    ));
}

#[tokio::test]
async fn destroy_during_slow_check_is_bounded() {
    let probe = ScriptedProbe::new(true);
    let adapter = ControlledAdapter::new();
    let source = ScriptedInterfaceSource::new(wired_snapshot());
    let monitor = build_monitor(fast_config(), &probe, &adapter, &source);
    monitor.initialize().await;

    // A debounced check is now hanging on a slow probe
    probe.set_delay(Duration::from_secs(30));
    adapter.emit(PlatformEvent::NetworkChange {
        kind: NetworkChangeKind::Link,
        detail: "eth0 down".to_string(),
    });
    sleep_ms(150).await;

    let result = tokio::time::timeout(Duration::from_secs(1), monitor.destroy()).await;
    assert!(result.is_ok(), "destroy must not wait for probes");
}
