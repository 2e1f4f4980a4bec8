// # Platform Adapters
//
// OS-native change sources and interface enumeration for connwatch.
//
// ## Adapters
//
// | Target  | Adapter          | Sources                                              |
// |---------|------------------|------------------------------------------------------|
// | macOS   | `MacosAdapter`   | SystemConfiguration plists, `route -n monitor`, `scutil`, `networksetup` |
// | Linux   | `LinuxAdapter`   | `nmcli monitor` or rtnetlink, `/sys/class/net`, `ip`, `nmcli`, `iwgetid` |
// | Windows | `WindowsAdapter` | `Get-NetAdapter`, CIM indications, `netsh wlan`      |
// | other   | `GenericAdapter` | interface table polling                              |
//
// Every external tool runs through `command`, with its own timeout. A missing
// tool costs fidelity and a log line, never the adapter.

pub mod command;
pub mod generic;
pub mod parse;
pub mod system;

mod watch;

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(windows)]
pub mod windows;

use connwatch_core::traits::{InterfaceSource, PlatformAdapter};
use std::sync::Arc;

pub use generic::GenericAdapter;
pub use system::SystemInterfaces;

/// Adapter for the platform this binary was built for
///
/// `interfaces` backs the adapters that infer state from the interface
/// table (Windows and the generic fallback).
#[cfg_attr(any(target_os = "linux", target_os = "macos"), allow(unused_variables))]
pub fn select_adapter(interfaces: Arc<dyn InterfaceSource>) -> Arc<dyn PlatformAdapter> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(macos::MacosAdapter::new())
    }

    #[cfg(target_os = "linux")]
    {
        Arc::new(linux::LinuxAdapter::new())
    }

    #[cfg(windows)]
    {
        Arc::new(windows::WindowsAdapter::new(interfaces))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", windows)))]
    {
        Arc::new(GenericAdapter::new(interfaces))
    }
}
