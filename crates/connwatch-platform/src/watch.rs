//! Building blocks shared by the adapters

use crate::parse::WifiStatus;
use connwatch_core::traits::{NetworkChangeKind, PlatformEvent};
use std::future::Future;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Background tasks owned by one adapter
///
/// Tasks hold their subprocess handles, so aborting a task kills its
/// children through `kill_on_drop`.
#[derive(Default)]
pub(crate) struct AdapterTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl AdapterTasks {
    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Abort every task and wait for it to unwind
    pub(crate) async fn stop(&self) {
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Drop for AdapterTasks {
    fn drop(&mut self) {
        for handle in self.handles.get_mut().iter() {
            handle.abort();
        }
    }
}

/// Forward an event; `false` once the consumer has gone away
pub(crate) fn send(tx: &mpsc::UnboundedSender<PlatformEvent>, event: PlatformEvent) -> bool {
    if tx.send(event).is_err() {
        debug!("Platform event stream dropped, stopping watcher");
        return false;
    }
    true
}

/// Turns periodic VPN observations into transition events
#[derive(Debug, Default)]
pub(crate) struct VpnTracker {
    last: Option<(bool, Option<String>)>,
}

impl VpnTracker {
    /// Event for the first observation, a flip, or a tunnel swap while active
    pub(crate) fn observe(&mut self, active: bool, name: Option<String>) -> Option<PlatformEvent> {
        let changed = match &self.last {
            None => true,
            Some((was_active, _)) if *was_active != active => true,
            Some((_, was_name)) => active && *was_name != name,
        };
        if !changed {
            return None;
        }
        self.last = Some((active, name.clone()));
        Some(PlatformEvent::VpnState {
            active,
            interface_name: name,
        })
    }
}

/// Turns periodic Wi-Fi observations into change events
#[derive(Debug, Default)]
pub(crate) struct WifiTracker {
    last: Option<Option<WifiStatus>>,
}

impl WifiTracker {
    /// Event on change; the first observation only sets the baseline
    pub(crate) fn observe(&mut self, status: Option<WifiStatus>) -> Option<PlatformEvent> {
        let previous = self.last.replace(status.clone())?;
        if previous == status {
            return None;
        }
        Some(PlatformEvent::NetworkChange {
            kind: NetworkChangeKind::Wifi,
            detail: describe_wifi(previous.as_ref(), status.as_ref()),
        })
    }
}

fn describe_wifi(old: Option<&WifiStatus>, new: Option<&WifiStatus>) -> String {
    match (old, new) {
        (_, None) => "wifi interface disappeared".to_string(),
        (None, Some(_)) => "wifi interface appeared".to_string(),
        (Some(old), Some(new)) if old.powered != new.powered => {
            format!("wifi power {}", if new.powered { "on" } else { "off" })
        }
        (Some(_), Some(new)) => match &new.ssid {
            Some(ssid) => format!("wifi joined {}", ssid),
            None => "wifi disassociated".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn wifi(powered: bool, ssid: Option<&str>) -> Option<WifiStatus> {
        Some(WifiStatus {
            powered,
            ssid: ssid.map(str::to_string),
        })
    }

    #[test]
    fn test_vpn_tracker_transitions() {
        let mut tracker = VpnTracker::default();

        // Baseline is always reported
        assert_eq!(
            tracker.observe(false, None),
            Some(PlatformEvent::VpnState {
                active: false,
                interface_name: None
            })
        );
        assert_eq!(tracker.observe(false, None), None);

        let up = tracker.observe(true, Some("utun3".to_string()));
        assert!(matches!(up, Some(PlatformEvent::VpnState { active: true, .. })));
        assert_eq!(tracker.observe(true, Some("utun3".to_string())), None);

        // Tunnel swap while active
        assert!(tracker.observe(true, Some("utun4".to_string())).is_some());

        assert!(tracker.observe(false, None).is_some());
    }

    #[test]
    fn test_wifi_tracker_reports_changes_only() {
        let mut tracker = WifiTracker::default();
        assert_eq!(tracker.observe(wifi(true, Some("Home"))), None);
        assert_eq!(tracker.observe(wifi(true, Some("Home"))), None);

        let event = tracker.observe(wifi(false, None));
        assert_eq!(
            event,
            Some(PlatformEvent::NetworkChange {
                kind: NetworkChangeKind::Wifi,
                detail: "wifi power off".to_string()
            })
        );

        let event = tracker.observe(wifi(true, Some("Office")));
        assert!(matches!(
            event,
            Some(PlatformEvent::NetworkChange { kind: NetworkChangeKind::Wifi, .. })
        ));
        assert!(tracker.observe(None).is_some());
    }

    #[tokio::test]
    async fn test_stop_aborts_tasks() {
        let tasks = AdapterTasks::default();
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        tasks.spawn(async move {
            let _tx = tx;
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        tasks.stop().await;
        // Sender dropped with the aborted task
        assert_eq!(rx.recv().await, None);
    }
}
