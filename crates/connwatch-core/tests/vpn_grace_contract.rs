//! Architectural Contract Test: VPN Transitions
//!
//! Constraints verified:
//! - An adapter's VPN-loss report inside the start-up grace window is ignored
//! - The same report after the window is honoured
//! - A report queued while the baseline check runs counts as inside the window
//! - Loss corroborated by the interface table is honoured even inside the window
//! - A VPN interface appearing mid-session yields exactly one VpnChange
//!   followed by exactly one extra comprehensive check
//!
//! If this test fails, someone has:
//! - Trusted slow platform heuristics at start-up (false "VPN lost" events)
//! - Scheduled both a debounced and a VPN check for the same transition

mod common;

use common::*;
use connwatch_core::traits::PlatformEvent;
use std::time::Duration;

fn vpn_snapshot(name: &str) -> connwatch_core::traits::InterfaceSnapshot {
    let mut snapshot = wired_snapshot();
    snapshot.insert(name.to_string(), vec!["10.8.0.2".parse().unwrap()]);
    snapshot
}

#[tokio::test]
async fn reported_loss_ignored_during_grace_period() {
    let probe = ScriptedProbe::new(true);
    let adapter = ControlledAdapter::new();
    let source = ScriptedInterfaceSource::new(vpn_snapshot("utun3"));
    let monitor = build_monitor(fast_config(), &probe, &adapter, &source);
    let mut rx = monitor.subscribe();

    let state = monitor.initialize().await;
    assert!(state.vpn_active, "VPN present at start is adopted");
    assert_eq!(state.vpn_interface_name.as_deref(), Some("utun3"));

    // Adapter has not found the VPN yet and reports it missing
    adapter.emit(PlatformEvent::VpnState {
        active: false,
        interface_name: None,
    });
    sleep_ms(100).await;

    assert!(monitor.state().vpn_active);
    assert!(vpn_changes(&drain(&mut rx)).is_empty());

    // Past the grace window the same report is trusted
    sleep_ms(300).await;
    adapter.emit(PlatformEvent::VpnState {
        active: false,
        interface_name: None,
    });
    sleep_ms(100).await;

    assert!(!monitor.state().vpn_active);
    assert_eq!(vpn_changes(&drain(&mut rx)), vec![(false, true, None)]);

    monitor.destroy().await;
}

#[tokio::test]
async fn loss_queued_during_slow_baseline_is_ignored() {
    let probe = ScriptedProbe::new(true);
    // Baseline outlasts the 300 ms grace window
    probe.set_delay(Duration::from_millis(400));
    let adapter = ControlledAdapter::new();
    let source = ScriptedInterfaceSource::new(vpn_snapshot("utun3"));
    let monitor = build_monitor(fast_config(), &probe, &adapter, &source);
    let mut rx = monitor.subscribe();

    // First adapter poll has not seen the tunnel yet
    adapter.emit(PlatformEvent::VpnState {
        active: false,
        interface_name: None,
    });

    let state = monitor.initialize().await;
    assert!(state.vpn_active);
    sleep_ms(500).await;

    assert!(monitor.state().vpn_active, "queued loss must not be trusted");
    assert_eq!(monitor.state().vpn_interface_name.as_deref(), Some("utun3"));
    assert!(vpn_changes(&drain(&mut rx)).is_empty());

    monitor.destroy().await;
}

#[tokio::test]
async fn corroborated_loss_honoured_during_grace_period() {
    let mut config = fast_config();
    config.engine.vpn_grace_period_ms = 5000;

    let probe = ScriptedProbe::new(true);
    let adapter = ControlledAdapter::new();
    let source = ScriptedInterfaceSource::new(vpn_snapshot("wg0"));
    let monitor = build_monitor(config, &probe, &adapter, &source);

    monitor.initialize().await;
    let mut rx = monitor.subscribe();

    // Tunnel interface really went away
    source.set(wired_snapshot());
    sleep_ms(200).await;

    assert!(!monitor.state().vpn_active);
    assert_eq!(monitor.state().vpn_interface_name, None);
    assert_eq!(
        vpn_changes(&drain(&mut rx)),
        vec![(false, true, Some("wg0".to_string()))]
    );

    monitor.destroy().await;
}

#[tokio::test]
async fn vpn_appearing_emits_one_change_and_one_check() {
    let probe = ScriptedProbe::new(true);
    let adapter = ControlledAdapter::new();
    let source = ScriptedInterfaceSource::new(wired_snapshot());
    let monitor = build_monitor(fast_config(), &probe, &adapter, &source);

    let state = monitor.initialize().await;
    assert!(!state.vpn_active);
    let baseline = probe.check_count();
    let mut rx = monitor.subscribe();

    source.set(vpn_snapshot("wg0"));
    sleep_ms(400).await;

    // The adapter catching up later must not produce a second transition
    adapter.emit(PlatformEvent::VpnState {
        active: true,
        interface_name: Some("wg0".to_string()),
    });
    sleep_ms(100).await;

    let events = drain(&mut rx);
    assert_eq!(
        vpn_changes(&events),
        vec![(true, false, Some("wg0".to_string()))]
    );
    assert_eq!(probe.check_count() - baseline, 1, "exactly one extra check");

    let state = monitor.state();
    assert!(state.vpn_active);
    assert_eq!(state.vpn_interface_name.as_deref(), Some("wg0"));

    monitor.destroy().await;
}

#[tokio::test]
async fn adapter_reported_vpn_triggers_check() {
    let probe = ScriptedProbe::new(true);
    let adapter = ControlledAdapter::new();
    let source = ScriptedInterfaceSource::new(wired_snapshot());
    let monitor = build_monitor(fast_config(), &probe, &adapter, &source);

    monitor.initialize().await;
    let baseline = probe.check_count();

    // IKEv2 services do not always surface a tunnel interface
    adapter.emit(PlatformEvent::VpnState {
        active: true,
        interface_name: Some("Corp IKEv2".to_string()),
    });
    sleep_ms(200).await;

    assert!(monitor.state().vpn_active);
    assert_eq!(probe.check_count() - baseline, 1);

    monitor.destroy().await;
}
