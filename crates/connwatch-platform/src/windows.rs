// # Windows Adapter
//
// - `Get-NetAdapter` polled every 2 s; status transitions become
//   `NetworkChange { kind: Adapter }`
// - A PowerShell CIM indication subscription on `Win32_NetworkAdapter`
//   modifications, read line by line, for changes between polls
// - VPN: tunnel-named interfaces with IPv4 in the interface table, or an up
//   adapter whose driver description names a VPN product
// - Wi-Fi: `netsh wlan show interfaces`

use crate::command::{run_command, spawn_line_monitor, COMMAND_TIMEOUT};
use crate::parse::{parse_net_adapters, parse_netsh_wlan, NetAdapterRow};
use crate::watch::{send, AdapterTasks, VpnTracker, WifiTracker};
use async_trait::async_trait;
use connwatch_core::interfaces::detect_vpn_interface;
use connwatch_core::traits::{InterfaceSource, NetworkChangeKind, PlatformAdapter, PlatformEvent};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

const ADAPTER_POLL_INTERVAL: Duration = Duration::from_secs(2);
const VPN_POLL_INTERVAL: Duration = Duration::from_secs(3);
const WIFI_POLL_INTERVAL: Duration = Duration::from_secs(5);
const SUBSCRIPTION_RESTART: Duration = Duration::from_secs(10);

const GET_ADAPTERS: &str = "Get-NetAdapter | \
    Select-Object Name,Status,InterfaceDescription | ConvertTo-Json -Compress";

const CIM_SUBSCRIPTION: &str = "\
$query = \"SELECT * FROM __InstanceModificationEvent WITHIN 2 WHERE TargetInstance ISA 'Win32_NetworkAdapter'\"; \
Register-CimIndicationEvent -Query $query -SourceIdentifier ConnwatchAdapter | Out-Null; \
while ($true) { \
  $e = Wait-Event -SourceIdentifier ConnwatchAdapter; \
  [Console]::Out.WriteLine($e.SourceEventArgs.NewEvent.TargetInstance.Name); \
  [Console]::Out.Flush(); \
  Remove-Event -EventIdentifier $e.EventIdentifier \
}";

/// Windows platform adapter
pub struct WindowsAdapter {
    interfaces: Arc<dyn InterfaceSource>,
    tasks: AdapterTasks,
}

impl WindowsAdapter {
    pub fn new(interfaces: Arc<dyn InterfaceSource>) -> Self {
        Self {
            interfaces,
            tasks: AdapterTasks::default(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for WindowsAdapter {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn start(&self) -> Pin<Box<dyn Stream<Item = PlatformEvent> + Send + 'static>> {
        let (tx, rx) = mpsc::unbounded_channel();
        info!("Starting Windows adapter");

        self.tasks.spawn(poll_adapters(tx.clone()));
        self.tasks.spawn(watch_cim(tx.clone()));
        self.tasks.spawn(poll_vpn(self.interfaces.clone(), tx.clone()));
        self.tasks.spawn(poll_wifi(tx));

        Box::pin(UnboundedReceiverStream::new(rx))
    }

    async fn stop(&self) {
        self.tasks.stop().await;
        debug!("Windows adapter stopped");
    }
}

async fn powershell(script: &str) -> Option<String> {
    run_command(
        "powershell",
        &["-NoProfile", "-NonInteractive", "-Command", script],
        COMMAND_TIMEOUT,
    )
    .await
}

async fn adapter_rows() -> Option<Vec<NetAdapterRow>> {
    let output = powershell(GET_ADAPTERS).await?;
    match parse_net_adapters(&output) {
        Ok(rows) => Some(rows),
        Err(e) => {
            warn!("Unreadable Get-NetAdapter output: {}", e);
            None
        }
    }
}

/// Adapters that appeared, vanished or changed status
fn adapter_differences(old: &[NetAdapterRow], new: &[NetAdapterRow]) -> Vec<String> {
    let before: BTreeMap<&str, &str> = old.iter().map(|r| (r.name.as_str(), r.status.as_str())).collect();
    let after: BTreeMap<&str, &str> = new.iter().map(|r| (r.name.as_str(), r.status.as_str())).collect();

    let mut details = Vec::new();
    for name in before.keys().filter(|name| !after.contains_key(*name)) {
        details.push(format!("{} removed", name));
    }
    for (name, status) in &after {
        match before.get(name) {
            None => details.push(format!("{} added ({})", name, status)),
            Some(previous) if previous != status => {
                details.push(format!("{} {} -> {}", name, previous, status))
            }
            Some(_) => {}
        }
    }
    details
}

async fn poll_adapters(tx: mpsc::UnboundedSender<PlatformEvent>) {
    let mut ticker = tokio::time::interval(ADAPTER_POLL_INTERVAL);
    let mut previous: Option<Vec<NetAdapterRow>> = None;

    loop {
        ticker.tick().await;
        let Some(rows) = adapter_rows().await else {
            continue;
        };
        if let Some(previous) = &previous {
            for detail in adapter_differences(previous, &rows) {
                let event = PlatformEvent::NetworkChange {
                    kind: NetworkChangeKind::Adapter,
                    detail,
                };
                if !send(&tx, event) {
                    return;
                }
            }
        }
        previous = Some(rows);
    }
}

async fn watch_cim(tx: mpsc::UnboundedSender<PlatformEvent>) {
    loop {
        match spawn_line_monitor(
            "powershell",
            &["-NoProfile", "-NonInteractive", "-Command", CIM_SUBSCRIPTION],
        ) {
            Ok(mut monitor) => {
                while let Some(line) = monitor.next_line().await {
                    let name = line.trim();
                    if name.is_empty() {
                        continue;
                    }
                    let event = PlatformEvent::NetworkChange {
                        kind: NetworkChangeKind::Adapter,
                        detail: format!("{} modified", name),
                    };
                    if !send(&tx, event) {
                        return;
                    }
                }
                warn!("CIM subscription ended, restarting in {:?}", SUBSCRIPTION_RESTART);
            }
            Err(e) => warn!("Cannot start CIM subscription: {}", e),
        }
        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(SUBSCRIPTION_RESTART).await;
    }
}

async fn poll_vpn(interfaces: Arc<dyn InterfaceSource>, tx: mpsc::UnboundedSender<PlatformEvent>) {
    let mut ticker = tokio::time::interval(VPN_POLL_INTERVAL);
    let mut tracker = VpnTracker::default();

    loop {
        ticker.tick().await;

        let from_table = match interfaces.snapshot().await {
            Ok(snapshot) => detect_vpn_interface(&snapshot),
            Err(e) => {
                debug!("Interface enumeration failed: {}", e);
                None
            }
        };
        let name = match from_table {
            Some(name) => Some(name),
            None => adapter_rows().await.and_then(|rows| {
                rows.into_iter()
                    .find(|row| row.is_up() && row.looks_like_vpn())
                    .map(|row| row.name)
            }),
        };

        if let Some(event) = tracker.observe(name.is_some(), name)
            && !send(&tx, event)
        {
            return;
        }
    }
}

async fn poll_wifi(tx: mpsc::UnboundedSender<PlatformEvent>) {
    let mut ticker = tokio::time::interval(WIFI_POLL_INTERVAL);
    let mut tracker = WifiTracker::default();

    loop {
        ticker.tick().await;
        let status = run_command("netsh", &["wlan", "show", "interfaces"], COMMAND_TIMEOUT)
            .await
            .and_then(|out| parse_netsh_wlan(&out));
        if let Some(event) = tracker.observe(status)
            && !send(&tx, event)
        {
            return;
        }
    }
}
