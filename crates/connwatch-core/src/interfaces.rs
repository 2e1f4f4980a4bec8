//! Interface snapshot differencer
//!
//! Polls an [`InterfaceSource`], diffs each snapshot against the previous one
//! and classifies the differences. A change is *significant* when it is
//! likely to flip online/offline status:
//! - an interface gained or lost routable IPv4 addresses, or
//! - a VPN-named interface came up or went down.
//!
//! IPv6-only churn is reported but not significant.
//!
//! VPN presence is inferred from the same snapshots and reported separately
//! through [`InterfaceDifferencer::take_vpn_signal`].

use crate::traits::{InterfaceSnapshot, InterfaceSource, VpnSignal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound for one enumeration
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

/// Name prefixes of tunnel-style interfaces
///
/// A starting heuristic, not a complete classifier of VPN products.
const VPN_NAME_PREFIXES: &[&str] = &[
    "utun", "tun", "tap", "ppp", "ipsec", "wg", "gpd", "tailscale", "zt", "nordlynx", "proton",
    "cscotun", "wintun",
];

/// Name fragments that mark a tunnel anywhere in the name (Windows adapter aliases)
const VPN_NAME_FRAGMENTS: &[&str] = &["vpn", "wireguard", "tunnel", "tap-windows"];

/// Kind of interface change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceChangeKind {
    /// Interface became routable (new, or regained a routable address)
    Added,
    /// Address set changed while the interface stayed routable
    Modified,
    /// Interface disappeared or lost its last routable address
    Removed,
}

/// One classified difference between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceChange {
    pub kind: InterfaceChangeKind,
    pub interface_name: String,
    /// Routable IPv4 present after the change
    pub has_routable_ipv4: bool,
    /// Routable IPv6 present after the change
    pub has_routable_ipv6: bool,
    /// Addresses before the change, when the interface was known
    pub previous_addresses: Option<Vec<IpAddr>>,
    /// Whether the change warrants a comprehensive check
    pub significant: bool,
}

/// Non-loopback, non-link-local, specified address
pub fn is_routable(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => !(v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()),
        IpAddr::V6(v6) => {
            let link_local = (v6.segments()[0] & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || link_local)
        }
    }
}

/// Whether an interface name looks like a tunnel
pub fn is_vpn_interface_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    VPN_NAME_PREFIXES.iter().any(|p| lower.starts_with(p))
        || VPN_NAME_FRAGMENTS.iter().any(|f| lower.contains(f))
}

fn routable_v4(addrs: &[IpAddr]) -> BTreeSet<IpAddr> {
    addrs
        .iter()
        .filter(|a| a.is_ipv4() && is_routable(a))
        .copied()
        .collect()
}

fn has_routable_v6(addrs: &[IpAddr]) -> bool {
    addrs.iter().any(|a| a.is_ipv6() && is_routable(a))
}

fn has_routable(addrs: &[IpAddr]) -> bool {
    addrs.iter().any(is_routable)
}

/// First VPN-named interface carrying a routable IPv4 address
///
/// Requiring IPv4 keeps idle system tunnels (e.g. macOS `utun0` with only a
/// link-local IPv6 address) from counting as an active VPN.
pub fn detect_vpn_interface(snapshot: &InterfaceSnapshot) -> Option<String> {
    snapshot
        .iter()
        .find(|(name, addrs)| is_vpn_interface_name(name) && !routable_v4(addrs).is_empty())
        .map(|(name, _)| name.clone())
}

/// Diff two snapshots into classified changes
pub fn diff_snapshots(old: &InterfaceSnapshot, new: &InterfaceSnapshot) -> Vec<InterfaceChange> {
    let mut changes = Vec::new();

    for (name, old_addrs) in old {
        if new.contains_key(name) || !has_routable(old_addrs) {
            continue;
        }
        changes.push(InterfaceChange {
            kind: InterfaceChangeKind::Removed,
            interface_name: name.clone(),
            has_routable_ipv4: false,
            has_routable_ipv6: false,
            previous_addresses: Some(old_addrs.clone()),
            significant: !routable_v4(old_addrs).is_empty() || is_vpn_interface_name(name),
        });
    }

    for (name, new_addrs) in new {
        let new_v4 = routable_v4(new_addrs);
        let new_v6 = has_routable_v6(new_addrs);
        let new_routable = has_routable(new_addrs);
        let is_vpn = is_vpn_interface_name(name);

        let Some(old_addrs) = old.get(name) else {
            if new_routable {
                changes.push(InterfaceChange {
                    kind: InterfaceChangeKind::Added,
                    interface_name: name.clone(),
                    has_routable_ipv4: !new_v4.is_empty(),
                    has_routable_ipv6: new_v6,
                    previous_addresses: None,
                    significant: !new_v4.is_empty() || is_vpn,
                });
            }
            continue;
        };

        let old_set: BTreeSet<&IpAddr> = old_addrs.iter().collect();
        let new_set: BTreeSet<&IpAddr> = new_addrs.iter().collect();
        if old_set == new_set {
            continue;
        }

        let old_v4 = routable_v4(old_addrs);
        let old_routable = has_routable(old_addrs);
        let v4_changed = old_v4 != new_v4;

        let kind = match (old_routable, new_routable) {
            (true, false) => InterfaceChangeKind::Removed,
            (false, true) => InterfaceChangeKind::Added,
            _ => InterfaceChangeKind::Modified,
        };

        changes.push(InterfaceChange {
            kind,
            interface_name: name.clone(),
            has_routable_ipv4: !new_v4.is_empty(),
            has_routable_ipv6: new_v6,
            previous_addresses: Some(old_addrs.clone()),
            significant: v4_changed || (is_vpn && old_routable != new_routable),
        });
    }

    changes
}

/// Snapshot differencer
///
/// The first call establishes the baseline and reports nothing. Enumeration
/// failures report nothing and keep the previous snapshot.
pub struct InterfaceDifferencer {
    source: Arc<dyn InterfaceSource>,
    previous: Option<InterfaceSnapshot>,
    vpn_interface: Option<String>,
    pending_vpn: Option<VpnSignal>,
}

impl InterfaceDifferencer {
    pub fn new(source: Arc<dyn InterfaceSource>) -> Self {
        Self {
            source,
            previous: None,
            vpn_interface: None,
            pending_vpn: None,
        }
    }

    /// Enumerate, diff against the previous snapshot and return the changes
    pub async fn check_interfaces(&mut self) -> Vec<InterfaceChange> {
        let result = tokio::time::timeout(SNAPSHOT_TIMEOUT, self.source.snapshot())
            .await
            .unwrap_or_else(|_| Err(crate::Error::timeout(SNAPSHOT_TIMEOUT)));
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Interface enumeration failed: {}", e);
                return Vec::new();
            }
        };

        let vpn_now = detect_vpn_interface(&snapshot);
        let changes = match self.previous.as_ref() {
            Some(previous) => {
                if vpn_now != self.vpn_interface {
                    debug!(
                        "Snapshot VPN interface: {:?} -> {:?}",
                        self.vpn_interface, vpn_now
                    );
                    self.pending_vpn = Some(VpnSignal::observed(
                        vpn_now.is_some(),
                        vpn_now.clone().or_else(|| self.vpn_interface.clone()),
                    ));
                }
                diff_snapshots(previous, &snapshot)
            }
            None => Vec::new(),
        };

        self.vpn_interface = vpn_now;
        self.previous = Some(snapshot);
        changes
    }

    /// VPN transition observed by the last `check_interfaces()`, if any
    pub fn take_vpn_signal(&mut self) -> Option<VpnSignal> {
        self.pending_vpn.take()
    }

    /// Last successfully enumerated snapshot
    pub fn snapshot(&self) -> Option<&InterfaceSnapshot> {
        self.previous.as_ref()
    }

    /// VPN interface present in the last snapshot
    pub fn vpn_interface(&self) -> Option<&str> {
        self.vpn_interface.as_deref()
    }
}
