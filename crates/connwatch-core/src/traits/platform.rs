// # Platform Adapter Trait
//
// Defines the interface for per-OS native change sources.
//
// ## Implementations
//
// - macOS, Windows, Linux and a generic polling fallback: `connwatch-platform` crate
//
// ## Usage
//
// ```rust,ignore
// use connwatch_core::PlatformAdapter;
// use tokio_stream::StreamExt;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let adapter = /* PlatformAdapter implementation */;
//
//     let mut events = adapter.start();
//     while let Some(event) = events.next().await {
//         println!("platform event: {:?}", event);
//     }
//
//     adapter.stop().await;
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// What kind of native change an adapter observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkChangeKind {
    /// Interface appeared, disappeared or changed addresses
    Interface,
    /// Link state changed (up/down, carrier)
    Link,
    /// Routing table mutation
    Route,
    /// System network configuration was rewritten
    Configuration,
    /// Wi-Fi power or SSID changed
    Wifi,
    /// Adapter status changed (Windows-style adapter table)
    Adapter,
}

impl std::fmt::Display for NetworkChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NetworkChangeKind::Interface => "interface",
            NetworkChangeKind::Link => "link",
            NetworkChangeKind::Route => "route",
            NetworkChangeKind::Configuration => "configuration",
            NetworkChangeKind::Wifi => "wifi",
            NetworkChangeKind::Adapter => "adapter",
        };
        f.write_str(name)
    }
}

/// Raw event emitted by a platform adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlatformEvent {
    /// Something about the network changed
    NetworkChange {
        kind: NetworkChangeKind,
        detail: String,
    },
    /// The adapter's view of VPN presence
    VpnState {
        active: bool,
        interface_name: Option<String>,
    },
}

/// VPN signal as seen by the monitor
///
/// `corroborated` marks signals derived from the interface table itself
/// (the tunnel interface really lost its address or vanished), as opposed to
/// an adapter's heuristic report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpnSignal {
    pub active: bool,
    pub interface_name: Option<String>,
    pub corroborated: bool,
}

impl VpnSignal {
    /// Signal reported by a platform adapter
    pub fn reported(active: bool, interface_name: Option<String>) -> Self {
        Self {
            active,
            interface_name,
            corroborated: false,
        }
    }

    /// Signal inferred from an interface snapshot transition
    pub fn observed(active: bool, interface_name: Option<String>) -> Self {
        Self {
            active,
            interface_name,
            corroborated: true,
        }
    }
}

/// Trait for platform adapter implementations
///
/// An adapter watches OS-native sources (config files, route monitors,
/// management daemons, diagnostic tools) so changes are noticed faster than
/// the monitor's own polling would.
///
/// # Failure Containment
///
/// - A missing or failing native tool must be logged and skipped, or replaced
///   by a weaker heuristic. It must never panic or end the stream early.
/// - Every external command needs its own timeout.
///
/// # Lifecycle
///
/// - `start()` is called once and returns the event stream
/// - `stop()` cancels every task and kills every subprocess the adapter spawned
/// - Dropping the stream must also let the adapter's tasks wind down
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Adapter name (for logging/debugging)
    fn name(&self) -> &'static str;

    /// Start watching and return the stream of raw events
    fn start(&self) -> Pin<Box<dyn Stream<Item = PlatformEvent> + Send + 'static>>;

    /// Stop all watches, timers and subprocesses
    async fn stop(&self);
}
