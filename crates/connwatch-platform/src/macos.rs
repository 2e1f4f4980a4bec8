// # macOS Adapter
//
// - Modification watch on the SystemConfiguration plists that configd
//   rewrites whenever a service, location or interface changes
// - A long-running `route -n monitor` for routing socket messages
// - VPN polling: connected `scutil --nc list` services first, then tunnel
//   interfaces with an IPv4 address from `ifconfig`, then tunnels scoped in
//   `scutil --proxy` (IKEv2 profiles often only show up there)
// - Wi-Fi power and SSID through `networksetup`

use crate::command::{run_command, spawn_line_monitor, COMMAND_TIMEOUT};
use crate::parse::{
    parse_airport_network, parse_airport_power, parse_ifconfig_tunnels, parse_route_monitor_line,
    parse_scutil_nc_list, parse_scutil_proxy_pac, parse_scutil_proxy_scoped, parse_wifi_device,
    WifiStatus,
};
use crate::watch::{send, AdapterTasks, VpnTracker, WifiTracker};
use async_trait::async_trait;
use connwatch_core::traits::{NetworkChangeKind, PlatformAdapter, PlatformEvent};
use std::collections::HashMap;
use std::pin::Pin;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

const WATCHED_PLISTS: &[&str] = &[
    "/Library/Preferences/SystemConfiguration/preferences.plist",
    "/Library/Preferences/SystemConfiguration/NetworkInterfaces.plist",
];

const PLIST_POLL_INTERVAL: Duration = Duration::from_secs(1);
const VPN_POLL_INTERVAL: Duration = Duration::from_secs(3);
const WIFI_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Delay before restarting `route -n monitor` after it exits
const ROUTE_MONITOR_RESTART: Duration = Duration::from_secs(5);

/// macOS platform adapter
#[derive(Default)]
pub struct MacosAdapter {
    tasks: AdapterTasks,
}

impl MacosAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlatformAdapter for MacosAdapter {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn start(&self) -> Pin<Box<dyn Stream<Item = PlatformEvent> + Send + 'static>> {
        let (tx, rx) = mpsc::unbounded_channel();
        info!("Starting macOS adapter");

        self.tasks.spawn(watch_plists(tx.clone()));
        self.tasks.spawn(watch_routes(tx.clone()));
        self.tasks.spawn(poll_vpn(tx.clone()));
        self.tasks.spawn(poll_wifi(tx));

        Box::pin(UnboundedReceiverStream::new(rx))
    }

    async fn stop(&self) {
        self.tasks.stop().await;
        debug!("macOS adapter stopped");
    }
}

async fn modified(path: &str) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

async fn watch_plists(tx: mpsc::UnboundedSender<PlatformEvent>) {
    let mut ticker = tokio::time::interval(PLIST_POLL_INTERVAL);
    let mut seen: HashMap<&'static str, Option<SystemTime>> = HashMap::new();

    loop {
        ticker.tick().await;
        for &path in WATCHED_PLISTS {
            let mtime = modified(path).await;
            let Some(previous) = seen.insert(path, mtime) else {
                continue;
            };
            if previous != mtime {
                let event = PlatformEvent::NetworkChange {
                    kind: NetworkChangeKind::Configuration,
                    detail: format!("{} rewritten", path),
                };
                if !send(&tx, event) {
                    return;
                }
            }
        }
    }
}

async fn watch_routes(tx: mpsc::UnboundedSender<PlatformEvent>) {
    loop {
        match spawn_line_monitor("route", &["-n", "monitor"]) {
            Ok(mut monitor) => {
                while let Some(line) = monitor.next_line().await {
                    if let Some((kind, detail)) = parse_route_monitor_line(&line)
                        && !send(&tx, PlatformEvent::NetworkChange { kind, detail })
                    {
                        return;
                    }
                }
                warn!("route monitor exited, restarting in {:?}", ROUTE_MONITOR_RESTART);
            }
            Err(e) => {
                warn!("Cannot start route monitor: {}", e);
            }
        }
        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(ROUTE_MONITOR_RESTART).await;
    }
}

/// Active tunnel by the strongest available signal
async fn detect_vpn(proxy_output: Option<&str>) -> Option<String> {
    if let Some(out) = run_command("scutil", &["--nc", "list"], COMMAND_TIMEOUT).await
        && let Some(service) = parse_scutil_nc_list(&out).into_iter().next()
    {
        return Some(service);
    }

    if let Some(out) = run_command("ifconfig", &[], COMMAND_TIMEOUT).await
        && let Some(tunnel) = parse_ifconfig_tunnels(&out).into_iter().next()
    {
        return Some(tunnel);
    }

    proxy_output.and_then(|out| parse_scutil_proxy_scoped(out).into_iter().next())
}

async fn poll_vpn(tx: mpsc::UnboundedSender<PlatformEvent>) {
    let mut ticker = tokio::time::interval(VPN_POLL_INTERVAL);
    let mut tracker = VpnTracker::default();
    let mut pac: Option<Option<String>> = None;

    loop {
        ticker.tick().await;

        let proxy = run_command("scutil", &["--proxy"], COMMAND_TIMEOUT).await;

        // A PAC switch usually accompanies a corporate tunnel going up or down
        if let Some(out) = proxy.as_deref() {
            let current = parse_scutil_proxy_pac(out);
            if let Some(previous) = pac.replace(current.clone())
                && previous != current
            {
                let detail = match &current {
                    Some(url) => format!("proxy auto-config set to {}", url),
                    None => "proxy auto-config cleared".to_string(),
                };
                let event = PlatformEvent::NetworkChange {
                    kind: NetworkChangeKind::Configuration,
                    detail,
                };
                if !send(&tx, event) {
                    return;
                }
            }
        }

        let name = detect_vpn(proxy.as_deref()).await;
        if let Some(event) = tracker.observe(name.is_some(), name)
            && !send(&tx, event)
        {
            return;
        }
    }
}

async fn wifi_status(device: &str) -> Option<WifiStatus> {
    let power = run_command("networksetup", &["-getairportpower", device], COMMAND_TIMEOUT)
        .await
        .and_then(|out| parse_airport_power(&out))?;
    let ssid = if power {
        run_command("networksetup", &["-getairportnetwork", device], COMMAND_TIMEOUT)
            .await
            .and_then(|out| parse_airport_network(&out))
    } else {
        None
    };
    Some(WifiStatus {
        powered: power,
        ssid,
    })
}

async fn poll_wifi(tx: mpsc::UnboundedSender<PlatformEvent>) {
    let device = run_command("networksetup", &["-listallhardwareports"], COMMAND_TIMEOUT)
        .await
        .and_then(|out| parse_wifi_device(&out));
    let Some(device) = device else {
        debug!("No Wi-Fi hardware port, Wi-Fi polling disabled");
        return;
    };

    let mut ticker = tokio::time::interval(WIFI_POLL_INTERVAL);
    let mut tracker = WifiTracker::default();
    loop {
        ticker.tick().await;
        if let Some(event) = tracker.observe(wifi_status(&device).await)
            && !send(&tx, event)
        {
            return;
        }
    }
}
