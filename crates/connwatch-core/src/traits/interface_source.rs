// # Interface Source Trait
//
// Enumerates local network interfaces and their addresses.
//
// ## Implementations
//
// - `getifaddrs(3)` on Unix, PowerShell `Get-NetIPAddress` on Windows:
//   `connwatch-platform::system::SystemInterfaces`
// - Scripted snapshots: `tests/common` of this crate

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Interface name -> assigned addresses
///
/// Only administratively up interfaces are listed.
pub type InterfaceSnapshot = BTreeMap<String, Vec<IpAddr>>;

/// Trait for interface enumeration
///
/// Implementations must return promptly; the monitor polls this on its fast
/// loop and bounds each call with a timeout.
#[async_trait]
pub trait InterfaceSource: Send + Sync {
    /// Enumerate interfaces that are up, with their addresses
    async fn snapshot(&self) -> Result<InterfaceSnapshot, crate::Error>;
}
