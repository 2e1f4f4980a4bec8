// # Network State
//
// The canonical record of what the engine believes about the network.
//
// Only `ConnectivityMonitor` writes it. Everything else receives clones,
// either from `ConnectivityMonitor::state()` or inside emitted events.

pub mod history;

pub use history::{StateChangeEntry, StateChangeHistory};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Connection quality, derived from probe confidence and latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    Offline,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl std::fmt::Display for NetworkQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NetworkQuality::Offline => "offline",
            NetworkQuality::Poor => "poor",
            NetworkQuality::Fair => "fair",
            NetworkQuality::Good => "good",
            NetworkQuality::Excellent => "excellent",
        };
        f.write_str(name)
    }
}

/// Snapshot of the canonical network state
///
/// Fields are public for reading. Instances handed out by the monitor are
/// copies, so mutating one has no effect on the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
    /// Whether the host is considered online
    pub is_online: bool,
    /// Quality class of the connection
    pub network_quality: NetworkQuality,
    /// Weighted success ratio of the last multi-endpoint check, in `[0, 1]`
    pub confidence: f64,
    /// Whether a VPN tunnel is believed active
    pub vpn_active: bool,
    /// Interface carrying the VPN, when known
    pub vpn_interface_name: Option<String>,
    /// Comprehensive checks in a row that ended offline
    pub consecutive_failures: u32,
    /// Time of the last completed comprehensive check
    pub last_check: Option<DateTime<Utc>>,
    /// Time `is_online` last flipped
    pub last_change: Option<DateTime<Utc>>,
    /// Last known interface snapshot (name -> addresses)
    pub interfaces: BTreeMap<String, Vec<IpAddr>>,
}

impl NetworkState {
    /// Pessimistic initial state: offline with zero confidence
    pub fn initial() -> Self {
        Self {
            is_online: false,
            network_quality: NetworkQuality::Offline,
            confidence: 0.0,
            vpn_active: false,
            vpn_interface_name: None,
            consecutive_failures: 0,
            last_check: None,
            last_change: None,
            interfaces: BTreeMap::new(),
        }
    }
}

impl Default for NetworkState {
    fn default() -> Self {
        Self::initial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_pessimistic() {
        let state = NetworkState::initial();
        assert!(!state.is_online);
        assert_eq!(state.network_quality, NetworkQuality::Offline);
        assert_eq!(state.confidence, 0.0);
        assert!(state.last_check.is_none());
    }

    #[test]
    fn test_quality_ordering() {
        assert!(NetworkQuality::Excellent > NetworkQuality::Good);
        assert!(NetworkQuality::Poor > NetworkQuality::Offline);
        assert_eq!(NetworkQuality::Fair.to_string(), "fair");
    }

    #[test]
    fn test_state_serializes_quality_lowercase() {
        let json = serde_json::to_value(NetworkState::initial()).unwrap();
        assert_eq!(json["network_quality"], "offline");
    }
}
