//! Interface enumeration against the running OS

use async_trait::async_trait;
use connwatch_core::traits::{InterfaceSnapshot, InterfaceSource};
use connwatch_core::{Error, Result};

/// Enumerates the host's interfaces
///
/// `getifaddrs(3)` on Unix; `Get-NetIPAddress` through PowerShell on Windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaces;

impl SystemInterfaces {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InterfaceSource for SystemInterfaces {
    async fn snapshot(&self) -> Result<InterfaceSnapshot> {
        enumerate().await
    }
}

#[cfg(unix)]
async fn enumerate() -> Result<InterfaceSnapshot> {
    tokio::task::spawn_blocking(getifaddrs_snapshot)
        .await
        .map_err(|e| Error::interfaces(format!("Enumeration task failed: {}", e)))?
}

#[cfg(unix)]
fn getifaddrs_snapshot() -> Result<InterfaceSnapshot> {
    use std::ffi::CStr;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    let mut snapshot = InterfaceSnapshot::new();

    // SAFETY: the list is only walked between a successful getifaddrs and
    // the matching freeifaddrs, and every pointer is null-checked first.
    unsafe {
        let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();
        if libc::getifaddrs(std::ptr::addr_of_mut!(ifaddrs)) != 0 {
            return Err(Error::interfaces(format!(
                "getifaddrs failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        let mut current = ifaddrs;
        while !current.is_null() {
            let ifa = &*current;
            current = ifa.ifa_next;

            if ifa.ifa_name.is_null() || (ifa.ifa_flags as i32 & libc::IFF_UP) == 0 {
                continue;
            }
            let name = CStr::from_ptr(ifa.ifa_name).to_string_lossy().into_owned();
            let addrs = snapshot.entry(name).or_default();

            if ifa.ifa_addr.is_null() {
                continue;
            }

            #[allow(clippy::cast_ptr_alignment)]
            let addr = match i32::from((*ifa.ifa_addr).sa_family) {
                libc::AF_INET => {
                    let sockaddr = ifa.ifa_addr.cast::<libc::sockaddr_in>();
                    Some(IpAddr::V4(Ipv4Addr::from(u32::from_be(
                        (*sockaddr).sin_addr.s_addr,
                    ))))
                }
                libc::AF_INET6 => {
                    let sockaddr = ifa.ifa_addr.cast::<libc::sockaddr_in6>();
                    Some(IpAddr::V6(Ipv6Addr::from((*sockaddr).sin6_addr.s6_addr)))
                }
                _ => None,
            };

            if let Some(addr) = addr
                && !addrs.contains(&addr)
            {
                addrs.push(addr);
            }
        }

        libc::freeifaddrs(ifaddrs);
    }

    Ok(snapshot)
}

#[cfg(windows)]
async fn enumerate() -> Result<InterfaceSnapshot> {
    use crate::command::{run_command, COMMAND_TIMEOUT};

    const SCRIPT: &str = "Get-NetIPAddress -AddressState Preferred | \
        Select-Object InterfaceAlias,IPAddress | ConvertTo-Json -Compress";

    let output = run_command(
        "powershell",
        &["-NoProfile", "-NonInteractive", "-Command", SCRIPT],
        COMMAND_TIMEOUT,
    )
    .await
    .ok_or_else(|| Error::interfaces("Get-NetIPAddress returned no output"))?;

    crate::parse::parse_net_ip_addresses(&output)
        .map_err(|e| Error::interfaces(format!("Unreadable Get-NetIPAddress output: {}", e)))
}

#[cfg(not(any(unix, windows)))]
async fn enumerate() -> Result<InterfaceSnapshot> {
    Err(Error::platform(
        "Interface enumeration is not supported on this platform",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loopback_is_listed() {
        let snapshot = SystemInterfaces::new().snapshot().await.unwrap();
        let has_loopback = snapshot
            .values()
            .flatten()
            .any(|addr| addr.is_loopback());
        assert!(has_loopback, "snapshot: {:?}", snapshot);
    }
}
