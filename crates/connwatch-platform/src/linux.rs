// # Linux Adapter
//
// Change sources, strongest first:
//
// - `nmcli monitor` when NetworkManager is present
// - otherwise an rtnetlink multicast subscription (link, address and route
//   groups) read directly with `netlink-sys`
// - a listing watch on `/sys/class/net`, always on
//
// VPN presence is polled from `ip -o link show` plus the active connections
// NetworkManager knows about. Wi-Fi comes from `nmcli radio wifi` and
// `iwgetid -r`.

use crate::command::{run_command, spawn_line_monitor, COMMAND_TIMEOUT};
use crate::parse::{
    parse_ip_link_tunnels, parse_nmcli_active_vpn, parse_nmcli_monitor_line, parse_nmcli_radio,
    WifiStatus,
};
use crate::watch::{send, AdapterTasks, VpnTracker, WifiTracker};
use async_trait::async_trait;
use connwatch_core::traits::{NetworkChangeKind, PlatformAdapter, PlatformEvent};
use netlink_packet_core::NetlinkBuffer;
use netlink_sys::{protocols::NETLINK_ROUTE, AsyncSocket, AsyncSocketExt, SocketAddr, TokioSocket};
use std::collections::BTreeSet;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

const SYSFS_NET: &str = "/sys/class/net";
const SYSFS_POLL_INTERVAL: Duration = Duration::from_secs(2);
const VPN_POLL_INTERVAL: Duration = Duration::from_secs(3);
const WIFI_POLL_INTERVAL: Duration = Duration::from_secs(5);

// rtnetlink message types
const RTM_NEWLINK: u16 = 16;
const RTM_DELLINK: u16 = 17;
const RTM_NEWADDR: u16 = 20;
const RTM_DELADDR: u16 = 21;
const RTM_NEWROUTE: u16 = 24;
const RTM_DELROUTE: u16 = 25;

/// Linux platform adapter
#[derive(Default)]
pub struct LinuxAdapter {
    tasks: AdapterTasks,
}

impl LinuxAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlatformAdapter for LinuxAdapter {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn start(&self) -> Pin<Box<dyn Stream<Item = PlatformEvent> + Send + 'static>> {
        let (tx, rx) = mpsc::unbounded_channel();
        info!("Starting Linux adapter");

        self.tasks.spawn(watch_network_changes(tx.clone()));
        self.tasks.spawn(watch_sysfs(tx.clone()));
        self.tasks.spawn(poll_vpn(tx.clone()));
        self.tasks.spawn(poll_wifi(tx));

        Box::pin(UnboundedReceiverStream::new(rx))
    }

    async fn stop(&self) {
        self.tasks.stop().await;
        debug!("Linux adapter stopped");
    }
}

/// NetworkManager monitor, falling back to rtnetlink
async fn watch_network_changes(tx: mpsc::UnboundedSender<PlatformEvent>) {
    match spawn_line_monitor("nmcli", &["monitor"]) {
        Ok(mut monitor) => {
            info!("Watching NetworkManager via nmcli monitor");
            while let Some(line) = monitor.next_line().await {
                if let Some((kind, detail)) = parse_nmcli_monitor_line(&line)
                    && !send(&tx, PlatformEvent::NetworkChange { kind, detail })
                {
                    return;
                }
            }
            warn!("nmcli monitor exited, falling back to netlink");
        }
        Err(e) => debug!("nmcli monitor unavailable ({}), using netlink", e),
    }

    if let Err(e) = watch_netlink(&tx).await {
        warn!("Netlink subscription failed: {}", e);
    }
}

async fn watch_netlink(tx: &mpsc::UnboundedSender<PlatformEvent>) -> std::io::Result<()> {
    let groups = (libc::RTMGRP_LINK
        | libc::RTMGRP_IPV4_IFADDR
        | libc::RTMGRP_IPV6_IFADDR
        | libc::RTMGRP_IPV4_ROUTE
        | libc::RTMGRP_IPV6_ROUTE) as u32;

    let mut socket = TokioSocket::new(NETLINK_ROUTE)?;
    socket.socket_mut().bind(&SocketAddr::new(0, groups))?;
    info!("Subscribed to rtnetlink link/address/route groups");

    loop {
        let (datagram, _) = socket.recv_from_full().await?;
        for (kind, detail) in classify_netlink_datagram(&datagram) {
            if !send(tx, PlatformEvent::NetworkChange { kind, detail }) {
                return Ok(());
            }
        }
    }
}

/// Classify every rtnetlink message in one datagram
pub(crate) fn classify_netlink_datagram(datagram: &[u8]) -> Vec<(NetworkChangeKind, String)> {
    let mut changes = Vec::new();
    let mut offset = 0;

    while offset < datagram.len() {
        let Ok(buffer) = NetlinkBuffer::new_checked(&datagram[offset..]) else {
            debug!("Truncated netlink message at offset {}", offset);
            break;
        };
        let length = buffer.length() as usize;
        if length == 0 {
            break;
        }

        let change = match buffer.message_type() {
            RTM_NEWLINK => Some((NetworkChangeKind::Link, "link added or changed")),
            RTM_DELLINK => Some((NetworkChangeKind::Link, "link removed")),
            RTM_NEWADDR => Some((NetworkChangeKind::Interface, "address added")),
            RTM_DELADDR => Some((NetworkChangeKind::Interface, "address removed")),
            RTM_NEWROUTE => Some((NetworkChangeKind::Route, "route added")),
            RTM_DELROUTE => Some((NetworkChangeKind::Route, "route removed")),
            _ => None,
        };
        if let Some((kind, detail)) = change {
            changes.push((kind, detail.to_string()));
        }

        // NLMSG_ALIGN
        offset += (length + 3) & !3;
    }
    changes
}

async fn sysfs_interfaces() -> Option<BTreeSet<String>> {
    let mut entries = match tokio::fs::read_dir(SYSFS_NET).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot list {}: {}", SYSFS_NET, e);
            return None;
        }
    };
    let mut names = BTreeSet::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        names.insert(entry.file_name().to_string_lossy().into_owned());
    }
    Some(names)
}

async fn watch_sysfs(tx: mpsc::UnboundedSender<PlatformEvent>) {
    let mut ticker = tokio::time::interval(SYSFS_POLL_INTERVAL);
    let mut previous: Option<BTreeSet<String>> = None;

    loop {
        ticker.tick().await;
        let Some(current) = sysfs_interfaces().await else {
            continue;
        };

        if let Some(previous) = &previous {
            let added = current.difference(previous).map(|n| format!("{} appeared", n));
            let removed = previous.difference(&current).map(|n| format!("{} disappeared", n));
            for detail in added.chain(removed) {
                let event = PlatformEvent::NetworkChange {
                    kind: NetworkChangeKind::Interface,
                    detail,
                };
                if !send(&tx, event) {
                    return;
                }
            }
        }
        previous = Some(current);
    }
}

async fn poll_vpn(tx: mpsc::UnboundedSender<PlatformEvent>) {
    let mut ticker = tokio::time::interval(VPN_POLL_INTERVAL);
    let mut tracker = VpnTracker::default();

    loop {
        ticker.tick().await;

        let mut tunnels = run_command("ip", &["-o", "link", "show"], COMMAND_TIMEOUT)
            .await
            .map(|out| parse_ip_link_tunnels(&out))
            .unwrap_or_default();

        if let Some(out) = run_command(
            "nmcli",
            &["-t", "-f", "NAME,TYPE,DEVICE", "connection", "show", "--active"],
            COMMAND_TIMEOUT,
        )
        .await
        {
            for name in parse_nmcli_active_vpn(&out) {
                if !tunnels.contains(&name) {
                    tunnels.push(name);
                }
            }
        }

        let name = tunnels.into_iter().next();
        if let Some(event) = tracker.observe(name.is_some(), name)
            && !send(&tx, event)
        {
            return;
        }
    }
}

async fn wifi_status() -> Option<WifiStatus> {
    let powered = run_command("nmcli", &["radio", "wifi"], COMMAND_TIMEOUT)
        .await
        .and_then(|out| parse_nmcli_radio(&out));
    let ssid = run_command("iwgetid", &["-r"], COMMAND_TIMEOUT)
        .await
        .map(|out| out.trim().to_string())
        .filter(|ssid| !ssid.is_empty());

    match (powered, ssid) {
        (None, None) => None,
        (powered, ssid) => Some(WifiStatus {
            powered: powered.unwrap_or(true),
            ssid,
        }),
    }
}

async fn poll_wifi(tx: mpsc::UnboundedSender<PlatformEvent>) {
    let mut ticker = tokio::time::interval(WIFI_POLL_INTERVAL);
    let mut tracker = WifiTracker::default();

    loop {
        ticker.tick().await;
        if let Some(event) = tracker.observe(wifi_status().await)
            && !send(&tx, event)
        {
            return;
        }
    }
}
