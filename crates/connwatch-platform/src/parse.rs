//! Parsers for the output of OS network tools
//!
//! Kept free of I/O and compiled on every platform so they can be tested
//! against captured output anywhere.

use connwatch_core::interfaces::{is_routable, is_vpn_interface_name};
use connwatch_core::traits::{InterfaceSnapshot, NetworkChangeKind};
use serde::Deserialize;
use std::net::IpAddr;

/// Wi-Fi radio and association state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiStatus {
    pub powered: bool,
    pub ssid: Option<String>,
}

// ---------------------------------------------------------------------------
// macOS
// ---------------------------------------------------------------------------

/// Names of connected services in `scutil --nc list`
pub fn parse_scutil_nc_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.contains("(Connected)"))
        .filter_map(|line| {
            let start = line.find('"')? + 1;
            let end = start + line[start..].find('"')?;
            Some(line[start..end].to_string())
        })
        .collect()
}

/// Tunnel interfaces in `ifconfig` output that are up with an IPv4 address
pub fn parse_ifconfig_tunnels(output: &str) -> Vec<String> {
    let mut tunnels = Vec::new();
    let mut current: Option<(String, bool, bool)> = None;

    let mut finish = |entry: Option<(String, bool, bool)>| {
        if let Some((name, up, has_v4)) = entry
            && up
            && has_v4
            && is_vpn_interface_name(&name)
        {
            tunnels.push(name);
        }
    };

    for line in output.lines() {
        if !line.starts_with(char::is_whitespace) && line.contains(": flags=") {
            finish(current.take());
            let name = line.split(':').next().unwrap_or_default().to_string();
            let up = flag_list(line).iter().any(|f| *f == "UP");
            current = Some((name, up, false));
        } else if let Some((_, _, has_v4)) = current.as_mut() {
            let mut fields = line.split_whitespace();
            if fields.next() == Some("inet")
                && let Some(addr) = fields.next().and_then(|a| a.parse::<IpAddr>().ok())
                && is_routable(&addr)
            {
                *has_v4 = true;
            }
        }
    }
    finish(current.take());
    tunnels
}

/// Tunnel interfaces scoped in `scutil --proxy` (`__SCOPED__` dictionary)
pub fn parse_scutil_proxy_scoped(output: &str) -> Vec<String> {
    let mut scoped = Vec::new();
    let mut depth: Option<usize> = None;

    for line in output.lines() {
        let trimmed = line.trim();
        match depth {
            None => {
                if trimmed.starts_with("__SCOPED__") && trimmed.ends_with('{') {
                    depth = Some(0);
                }
            }
            Some(d) => {
                if trimmed.ends_with('{') {
                    if d == 0 {
                        let key = trimmed.split(" : ").next().unwrap_or_default().trim();
                        if is_vpn_interface_name(key) {
                            scoped.push(key.to_string());
                        }
                    }
                    depth = Some(d + 1);
                } else if trimmed == "}" {
                    if d == 0 {
                        break;
                    }
                    depth = Some(d - 1);
                }
            }
        }
    }
    scoped
}

/// PAC URL from `scutil --proxy`, when automatic proxy configuration is on
pub fn parse_scutil_proxy_pac(output: &str) -> Option<String> {
    let mut enabled = false;
    let mut url = None;
    for line in output.lines() {
        let Some((key, value)) = line.split_once(" : ") else {
            continue;
        };
        match key.trim() {
            "ProxyAutoConfigEnable" => enabled = value.trim() == "1",
            "ProxyAutoConfigURLString" if url.is_none() => url = Some(value.trim().to_string()),
            _ => {}
        }
    }
    url.filter(|_| enabled)
}

/// Classify a line of `route -n monitor` output
pub fn parse_route_monitor_line(line: &str) -> Option<(NetworkChangeKind, String)> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with("RTM_") {
        return None;
    }
    let message = trimmed.split(':').next().unwrap_or(trimmed);
    let kind = match message {
        "RTM_ADD" | "RTM_DELETE" | "RTM_CHANGE" | "RTM_LOSING" | "RTM_REDIRECT" => {
            NetworkChangeKind::Route
        }
        "RTM_IFINFO" | "RTM_IFINFO2" => NetworkChangeKind::Link,
        "RTM_NEWADDR" | "RTM_DELADDR" => NetworkChangeKind::Interface,
        _ => return None,
    };
    Some((kind, trimmed.to_string()))
}

/// Device of the Wi-Fi port in `networksetup -listallhardwareports`
pub fn parse_wifi_device(output: &str) -> Option<String> {
    let mut lines = output.lines();
    while let Some(line) = lines.next() {
        let port = line.strip_prefix("Hardware Port: ").map(str::trim);
        if matches!(port, Some("Wi-Fi") | Some("AirPort")) {
            return lines
                .next()
                .and_then(|l| l.strip_prefix("Device: "))
                .map(|d| d.trim().to_string());
        }
    }
    None
}

/// `networksetup -getairportpower <dev>` → powered
pub fn parse_airport_power(output: &str) -> Option<bool> {
    let value = output.lines().find_map(|l| l.split_once("):"))?.1.trim();
    match value {
        "On" => Some(true),
        "Off" => Some(false),
        _ => None,
    }
}

/// `networksetup -getairportnetwork <dev>` → SSID
pub fn parse_airport_network(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|l| l.strip_prefix("Current Wi-Fi Network: "))
        .map(|ssid| ssid.trim().to_string())
        .filter(|ssid| !ssid.is_empty())
}

// ---------------------------------------------------------------------------
// Linux
// ---------------------------------------------------------------------------

/// Tunnel interfaces with UP and LOWER_UP in `ip -o link show`
pub fn parse_ip_link_tunnels(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(3, ": ");
            let _index = fields.next()?;
            let name = fields.next()?.split('@').next()?.trim();
            let flags = flag_list(fields.next()?);
            let up = flags.contains(&"UP") && flags.contains(&"LOWER_UP");
            (up && is_vpn_interface_name(name)).then(|| name.to_string())
        })
        .collect()
}

/// Active VPN connections in `nmcli -t -f NAME,TYPE,DEVICE connection show --active`
///
/// Returns the device when NetworkManager reports one, else the connection name.
pub fn parse_nmcli_active_vpn(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            // NAME may contain escaped colons; split from the right
            let mut fields = line.rsplitn(3, ':');
            let device = fields.next()?.trim();
            let kind = fields.next()?.trim();
            let name = fields.next()?.replace("\\:", ":");
            if kind != "vpn" && kind != "wireguard" {
                return None;
            }
            if device.is_empty() || device == "--" {
                Some(name)
            } else {
                Some(device.to_string())
            }
        })
        .collect()
}

/// Classify a line of `nmcli monitor` output
pub fn parse_nmcli_monitor_line(line: &str) -> Option<(NetworkChangeKind, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let kind = if trimmed.ends_with("device created") || trimmed.ends_with("device removed") {
        NetworkChangeKind::Interface
    } else if trimmed.starts_with("Connectivity is now")
        || trimmed.contains("is now in the")
        || trimmed.contains("using connection")
    {
        NetworkChangeKind::Configuration
    } else if trimmed.contains("primary connection") {
        NetworkChangeKind::Route
    } else if [": connected", ": disconnected", ": unavailable", ": unmanaged"]
        .iter()
        .any(|s| trimmed.ends_with(s))
    {
        NetworkChangeKind::Link
    } else {
        return None;
    };
    Some((kind, trimmed.to_string()))
}

/// `nmcli radio wifi` → powered
pub fn parse_nmcli_radio(output: &str) -> Option<bool> {
    match output.trim() {
        "enabled" => Some(true),
        "disabled" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// `netsh wlan show interfaces`; `None` when there is no wireless interface
pub fn parse_netsh_wlan(output: &str) -> Option<WifiStatus> {
    if output.contains("There is no wireless interface") {
        return None;
    }

    let mut state = None;
    let mut ssid = None;
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "State" => state = Some(value.trim().to_string()),
            "SSID" if ssid.is_none() => ssid = Some(value.trim().to_string()),
            _ => {}
        }
    }

    state.as_ref()?;
    let connected = state.as_deref() == Some("connected");
    Some(WifiStatus {
        powered: !output.contains("Software Off"),
        ssid: ssid.filter(|s| connected && !s.is_empty()),
    })
}

/// One row of `Get-NetAdapter | Select-Object Name,Status,InterfaceDescription`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetAdapterRow {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "InterfaceDescription", default)]
    pub description: String,
}

impl NetAdapterRow {
    pub fn is_up(&self) -> bool {
        self.status.eq_ignore_ascii_case("up")
    }

    /// Adapter alias or driver description looks like a tunnel
    pub fn looks_like_vpn(&self) -> bool {
        if is_vpn_interface_name(&self.name) {
            return true;
        }
        let description = self.description.to_ascii_lowercase();
        ["vpn", "wireguard", "tap-windows", "wintun", "tunnel", "anyconnect", "fortinet"]
            .iter()
            .any(|needle| description.contains(needle))
    }
}

/// PowerShell emits a bare object instead of an array for a single row
fn json_rows<T: for<'de> Deserialize<'de>>(json: &str) -> Result<Vec<T>, serde_json::Error> {
    let trimmed = json.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let value: serde_json::Value = serde_json::from_str(trimmed)?;
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect(),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}

/// Parse `Get-NetAdapter ... | ConvertTo-Json`
pub fn parse_net_adapters(json: &str) -> Result<Vec<NetAdapterRow>, serde_json::Error> {
    json_rows(json)
}

#[derive(Deserialize)]
struct NetIpAddressRow {
    #[serde(rename = "InterfaceAlias")]
    interface_alias: String,
    #[serde(rename = "IPAddress")]
    ip_address: String,
}

/// Parse `Get-NetIPAddress ... | ConvertTo-Json` into a snapshot
///
/// Zone suffixes (`fe80::1%12`) are stripped; unparseable rows are skipped.
pub fn parse_net_ip_addresses(json: &str) -> Result<InterfaceSnapshot, serde_json::Error> {
    let rows: Vec<NetIpAddressRow> = json_rows(json)?;
    let mut snapshot = InterfaceSnapshot::new();
    for row in rows {
        let address = row.ip_address.split('%').next().unwrap_or_default();
        if let Ok(ip) = address.parse::<IpAddr>() {
            snapshot.entry(row.interface_alias).or_default().push(ip);
        }
    }
    Ok(snapshot)
}

/// Flags between `<` and `>` on an interface header line
fn flag_list(line: &str) -> Vec<&str> {
    let Some(start) = line.find('<') else {
        return Vec::new();
    };
    let Some(len) = line[start + 1..].find('>') else {
        return Vec::new();
    };
    line[start + 1..start + 1 + len].split(',').collect()
}
