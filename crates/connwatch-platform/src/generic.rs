//! Polling adapter for hosts without a native change source

use crate::watch::{send, AdapterTasks, VpnTracker};
use async_trait::async_trait;
use connwatch_core::interfaces::detect_vpn_interface;
use connwatch_core::traits::{
    InterfaceSnapshot, InterfaceSource, NetworkChangeKind, PlatformAdapter, PlatformEvent,
};
use std::collections::BTreeSet;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// Default interval between interface table polls
pub const GENERIC_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Reports raw interface table differences and tunnel presence
pub struct GenericAdapter {
    interfaces: Arc<dyn InterfaceSource>,
    interval: Duration,
    tasks: AdapterTasks,
}

impl GenericAdapter {
    pub fn new(interfaces: Arc<dyn InterfaceSource>) -> Self {
        Self::with_interval(interfaces, GENERIC_POLL_INTERVAL)
    }

    pub fn with_interval(interfaces: Arc<dyn InterfaceSource>, interval: Duration) -> Self {
        Self {
            interfaces,
            interval,
            tasks: AdapterTasks::default(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for GenericAdapter {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn start(&self) -> Pin<Box<dyn Stream<Item = PlatformEvent> + Send + 'static>> {
        let (tx, rx) = mpsc::unbounded_channel();
        info!("Starting generic adapter (poll every {:?})", self.interval);
        self.tasks
            .spawn(poll_interface_table(self.interfaces.clone(), self.interval, tx));
        Box::pin(UnboundedReceiverStream::new(rx))
    }

    async fn stop(&self) {
        self.tasks.stop().await;
        debug!("Generic adapter stopped");
    }
}

async fn poll_interface_table(
    interfaces: Arc<dyn InterfaceSource>,
    interval: Duration,
    tx: mpsc::UnboundedSender<PlatformEvent>,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut previous: Option<InterfaceSnapshot> = None;
    let mut vpn = VpnTracker::default();

    loop {
        ticker.tick().await;

        let snapshot = match interfaces.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Interface poll failed: {}", e);
                continue;
            }
        };

        if let Some(previous) = &previous {
            for detail in raw_differences(previous, &snapshot) {
                let event = PlatformEvent::NetworkChange {
                    kind: NetworkChangeKind::Interface,
                    detail,
                };
                if !send(&tx, event) {
                    return;
                }
            }
        }

        let tunnel = detect_vpn_interface(&snapshot);
        if let Some(event) = vpn.observe(tunnel.is_some(), tunnel)
            && !send(&tx, event)
        {
            return;
        }

        previous = Some(snapshot);
    }
}

/// Every interface that appeared, vanished or changed addresses
pub(crate) fn raw_differences(old: &InterfaceSnapshot, new: &InterfaceSnapshot) -> Vec<String> {
    let mut details = Vec::new();
    for name in old.keys().filter(|name| !new.contains_key(*name)) {
        details.push(format!("{} removed", name));
    }
    for (name, addrs) in new {
        match old.get(name) {
            None => details.push(format!("{} added", name)),
            Some(old_addrs) => {
                let before: BTreeSet<_> = old_addrs.iter().collect();
                let after: BTreeSet<_> = addrs.iter().collect();
                if before != after {
                    details.push(format!("{} addresses changed", name));
                }
            }
        }
    }
    details
}
