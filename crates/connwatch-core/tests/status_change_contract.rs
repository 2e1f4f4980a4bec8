//! Architectural Contract Test: Status Change Semantics
//!
//! Constraints verified:
//! - StatusChange is emitted if and only if `is_online` flips
//! - A check where every probe fails yields offline, quality offline, confidence 0
//! - High confidence at low latency maps to excellent quality
//! - Confidence reported by a misbehaving probe stays inside [0, 1]
//! - Flips are recorded in the bounded history
//!
//! If this test fails, someone has:
//! - Emitted events for checks that did not change the verdict
//! - Let quality and the online verdict disagree

mod common;

use common::*;
use connwatch_core::{MonitorEvent, NetworkQuality};

#[tokio::test]
async fn status_change_emitted_only_on_flip() {
    let probe = ScriptedProbe::new(true);
    let adapter = ControlledAdapter::new();
    let source = ScriptedInterfaceSource::new(wired_snapshot());
    let monitor = build_monitor(fast_config(), &probe, &adapter, &source);
    let mut rx = monitor.subscribe();

    // Baseline flips the pessimistic initial state to online
    let state = monitor.initialize().await;
    assert!(state.is_online);

    monitor.force_check().await;
    monitor.force_check().await;

    probe.set_online(false);
    monitor.force_check().await;
    monitor.force_check().await;

    probe.set_online(true);
    monitor.force_check().await;

    let events = drain(&mut rx);
    assert_eq!(
        status_changes(&events),
        vec![(false, true), (true, false), (false, true)],
        "one StatusChange per flip and none otherwise"
    );
    assert!(events.iter().any(|e| matches!(e, MonitorEvent::Started { .. })));

    monitor.destroy().await;
}

#[tokio::test]
async fn all_probes_failing_reports_offline() {
    let probe = ScriptedProbe::new(false);
    let adapter = ControlledAdapter::new();
    let source = ScriptedInterfaceSource::new(wired_snapshot());
    let monitor = build_monitor(fast_config(), &probe, &adapter, &source);
    let mut rx = monitor.subscribe();

    let state = monitor.initialize().await;
    assert!(!state.is_online);
    assert_eq!(state.network_quality, NetworkQuality::Offline);
    assert_eq!(state.confidence, 0.0);
    assert_eq!(state.consecutive_failures, 1);
    assert!(state.last_check.is_some());

    let state = monitor.force_check().await;
    assert_eq!(state.consecutive_failures, 2);

    assert!(
        status_changes(&drain(&mut rx)).is_empty(),
        "offline to offline is not a status change"
    );

    monitor.destroy().await;
}

#[tokio::test]
async fn high_confidence_low_latency_is_excellent() {
    let probe = ScriptedProbe::new(true);
    probe.set_quality(0.9, 50.0);
    let adapter = ControlledAdapter::new();
    let source = ScriptedInterfaceSource::new(wired_snapshot());
    let monitor = build_monitor(fast_config(), &probe, &adapter, &source);

    let state = monitor.initialize().await;
    assert!(state.is_online);
    assert_eq!(state.network_quality, NetworkQuality::Excellent);

    probe.set_quality(0.5, 600.0);
    let state = monitor.force_check().await;
    assert_eq!(state.network_quality, NetworkQuality::Fair);

    monitor.destroy().await;
}

#[tokio::test]
async fn quality_change_without_flip_emits_connectivity_change() {
    let probe = ScriptedProbe::new(true);
    let adapter = ControlledAdapter::new();
    let source = ScriptedInterfaceSource::new(wired_snapshot());
    let monitor = build_monitor(fast_config(), &probe, &adapter, &source);
    monitor.initialize().await;

    let mut rx = monitor.subscribe();
    probe.set_quality(0.7, 200.0);
    monitor.force_check().await;
    monitor.force_check().await;

    let events = drain(&mut rx);
    let connectivity: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            MonitorEvent::ConnectivityChange { state, .. } => Some(state.network_quality),
            _ => None,
        })
        .collect();
    assert_eq!(connectivity, vec![NetworkQuality::Good]);
    assert!(status_changes(&events).is_empty());

    monitor.destroy().await;
}

#[tokio::test]
async fn confidence_is_clamped() {
    let probe = ScriptedProbe::new(true);
    probe.set_quality(4.2, 20.0);
    let adapter = ControlledAdapter::new();
    let source = ScriptedInterfaceSource::new(wired_snapshot());
    let monitor = build_monitor(fast_config(), &probe, &adapter, &source);

    let state = monitor.initialize().await;
    assert!((0.0..=1.0).contains(&state.confidence));
    assert_eq!(state.network_quality, NetworkQuality::Excellent);

    monitor.destroy().await;
}

#[tokio::test]
async fn flips_are_recorded_in_history() {
    let probe = ScriptedProbe::new(true);
    let adapter = ControlledAdapter::new();
    let source = ScriptedInterfaceSource::new(wired_snapshot());
    let monitor = build_monitor(fast_config(), &probe, &adapter, &source);
    monitor.initialize().await;
    assert!(!monitor.is_flapping());

    for online in [false, true, false] {
        probe.set_online(online);
        monitor.force_check().await;
    }

    let history = monitor.history();
    assert_eq!(history.len(), 4);
    assert!(!history[0].was_online && history[0].is_online);
    assert!(history[1].duration_in_previous_state.is_some());
    assert!(monitor.is_flapping());

    monitor.destroy().await;
}
