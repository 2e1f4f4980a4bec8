//! Configuration types for the connwatch engine
//!
//! Every field has a serde default so partial configuration files and the
//! daemon's environment overrides only need to mention what they change.
//! Platforms that are slow to report failed connections get shorter probe
//! timeouts by default.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Smallest DNS matrix that still tolerates one bad resolver and one bad domain
pub const MIN_DNS_DOMAINS: usize = 3;
pub const MIN_DNS_RESOLVERS: usize = 3;

/// Main monitor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Scheduling and bookkeeping settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Connectivity probe settings
    #[serde(default)]
    pub probes: ProbeConfig,
}

impl MonitorConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.engine.validate()?;
        self.probes.validate()?;
        Ok(())
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval of the fast interface-snapshot loop (in milliseconds)
    #[serde(default = "default_interface_poll_interval_ms")]
    pub interface_poll_interval_ms: u64,

    /// Interval of the full connectivity loop (in seconds)
    #[serde(default = "default_connectivity_interval_secs")]
    pub connectivity_interval_secs: u64,

    /// Quiet period required after a significant signal before probing (in milliseconds)
    ///
    /// Every new signal inside the window restarts it, so a burst from
    /// flapping hardware collapses into one comprehensive check.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Window after start during which uncorroborated VPN loss is ignored (in milliseconds)
    #[serde(default = "default_vpn_grace_period_ms")]
    pub vpn_grace_period_ms: u64,

    /// Capacity of the broadcast channel feeding subscribers
    ///
    /// Slow subscribers that fall further behind than this lose the oldest events.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Number of online/offline transitions kept for flap diagnostics
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl EngineConfig {
    /// Interface loop period
    pub fn interface_poll_interval(&self) -> Duration {
        Duration::from_millis(self.interface_poll_interval_ms)
    }

    /// Connectivity loop period
    pub fn connectivity_interval(&self) -> Duration {
        Duration::from_secs(self.connectivity_interval_secs)
    }

    /// Debounce window
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// VPN start-up grace window
    ///
    /// Counted from the moment the monitor starts consuming adapter events,
    /// after the baseline check.
    pub fn vpn_grace_period(&self) -> Duration {
        Duration::from_millis(self.vpn_grace_period_ms)
    }

    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interface_poll_interval_ms == 0 {
            return Err(crate::Error::config("Interface poll interval must be > 0"));
        }
        if self.connectivity_interval_secs == 0 {
            return Err(crate::Error::config("Connectivity interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.history_capacity == 0 {
            return Err(crate::Error::config("History capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interface_poll_interval_ms: default_interface_poll_interval_ms(),
            connectivity_interval_secs: default_connectivity_interval_secs(),
            debounce_ms: default_debounce_ms(),
            vpn_grace_period_ms: default_vpn_grace_period_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            history_capacity: default_history_capacity(),
        }
    }
}

fn default_interface_poll_interval_ms() -> u64 {
    1000
}

fn default_connectivity_interval_secs() -> u64 {
    30
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_vpn_grace_period_ms() -> u64 {
    5000
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_history_capacity() -> usize {
    10
}

/// Probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// URL hit by the basic reachability check
    #[serde(default = "default_basic_url")]
    pub basic_url: String,

    /// Timeout of the basic check (in milliseconds)
    #[serde(default = "default_basic_timeout_ms")]
    pub basic_timeout_ms: u64,

    /// Outer ceiling for one comprehensive check (in milliseconds)
    #[serde(default = "default_comprehensive_timeout_ms")]
    pub comprehensive_timeout_ms: u64,

    /// Domains resolved by the DNS check
    #[serde(default = "default_dns_domains")]
    pub dns_domains: Vec<String>,

    /// Public resolvers queried by the DNS check
    #[serde(default = "default_dns_resolvers")]
    pub dns_resolvers: Vec<SocketAddr>,

    /// Timeout of one DNS query (in milliseconds)
    #[serde(default = "default_dns_timeout_ms")]
    pub dns_timeout_ms: u64,

    /// Endpoints of the weighted multi-endpoint check
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<EndpointConfig>,
}

impl ProbeConfig {
    /// Basic check timeout
    pub fn basic_timeout(&self) -> Duration {
        Duration::from_millis(self.basic_timeout_ms)
    }

    /// Comprehensive check ceiling
    pub fn comprehensive_timeout(&self) -> Duration {
        Duration::from_millis(self.comprehensive_timeout_ms)
    }

    /// Single DNS query timeout
    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    /// Sum of all endpoint weights
    pub fn total_weight(&self) -> f64 {
        self.endpoints.iter().map(|e| e.weight).sum()
    }

    /// Validate the probe configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.basic_url.is_empty() {
            return Err(crate::Error::config("Basic check URL cannot be empty"));
        }
        if self.basic_timeout_ms == 0 || self.dns_timeout_ms == 0 {
            return Err(crate::Error::config("Probe timeouts must be > 0"));
        }
        if self.comprehensive_timeout_ms == 0 {
            return Err(crate::Error::config("Comprehensive check ceiling must be > 0"));
        }
        if self.dns_domains.len() < MIN_DNS_DOMAINS
            || self.dns_resolvers.len() < MIN_DNS_RESOLVERS
        {
            return Err(crate::Error::config(format!(
                "DNS check needs at least {} domains and {} resolvers (got {} and {})",
                MIN_DNS_DOMAINS,
                MIN_DNS_RESOLVERS,
                self.dns_domains.len(),
                self.dns_resolvers.len()
            )));
        }
        if self.endpoints.is_empty() {
            return Err(crate::Error::config("No probe endpoints configured"));
        }
        for endpoint in &self.endpoints {
            endpoint.validate()?;
        }
        Ok(())
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            basic_url: default_basic_url(),
            basic_timeout_ms: default_basic_timeout_ms(),
            comprehensive_timeout_ms: default_comprehensive_timeout_ms(),
            dns_domains: default_dns_domains(),
            dns_resolvers: default_dns_resolvers(),
            dns_timeout_ms: default_dns_timeout_ms(),
            endpoints: default_endpoints(),
        }
    }
}

/// One weighted endpoint of the multi-endpoint check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Short label used in evidence and logs
    pub name: String,

    /// What to contact
    pub target: EndpointTarget,

    /// Trust weight of a success from this endpoint
    #[serde(default = "default_endpoint_weight")]
    pub weight: f64,

    /// Per-endpoint timeout (in milliseconds)
    #[serde(default = "default_endpoint_timeout_ms")]
    pub timeout_ms: u64,
}

impl EndpointConfig {
    /// Create an HTTP(S) endpoint
    pub fn http(name: impl Into<String>, url: impl Into<String>, weight: f64, timeout_ms: u64) -> Self {
        Self {
            name: name.into(),
            target: EndpointTarget::Http { url: url.into() },
            weight,
            timeout_ms,
        }
    }

    /// Create a raw TCP endpoint
    pub fn tcp(name: impl Into<String>, addr: SocketAddr, weight: f64, timeout_ms: u64) -> Self {
        Self {
            name: name.into(),
            target: EndpointTarget::Tcp { addr },
            weight,
            timeout_ms,
        }
    }

    /// Endpoint timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if !(self.weight.is_finite() && self.weight > 0.0) {
            return Err(crate::Error::config(format!(
                "Endpoint {} must have a positive weight",
                self.name
            )));
        }
        if self.timeout_ms == 0 {
            return Err(crate::Error::config(format!(
                "Endpoint {} timeout must be > 0",
                self.name
            )));
        }
        if let EndpointTarget::Http { url } = &self.target
            && !url.starts_with("http://")
            && !url.starts_with("https://")
        {
            return Err(crate::Error::config(format!(
                "Endpoint {} must use an HTTP or HTTPS URL. Got: {}",
                self.name, url
            )));
        }
        Ok(())
    }
}

/// Endpoint kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EndpointTarget {
    /// HTTP(S) request; any response counts as reachable
    Http {
        /// URL to request
        url: String,
    },

    /// Raw TCP connect to an IP address, bypassing DNS
    Tcp {
        /// Address to connect to
        addr: SocketAddr,
    },
}

fn default_basic_url() -> String {
    "https://connectivitycheck.gstatic.com/generate_204".to_string()
}

fn default_basic_timeout_ms() -> u64 {
    if cfg!(windows) { 2000 } else { 3000 }
}

fn default_comprehensive_timeout_ms() -> u64 {
    if cfg!(windows) { 6000 } else { 10_000 }
}

fn default_dns_domains() -> Vec<String> {
    ["google.com", "cloudflare.com", "microsoft.com"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_dns_resolvers() -> Vec<SocketAddr> {
    vec![
        SocketAddr::from(([8, 8, 8, 8], 53)),
        SocketAddr::from(([1, 1, 1, 1], 53)),
        SocketAddr::from(([9, 9, 9, 9], 53)),
    ]
}

fn default_dns_timeout_ms() -> u64 {
    2000
}

fn default_endpoint_weight() -> f64 {
    1.0
}

fn default_endpoint_timeout_ms() -> u64 {
    3000
}

fn default_endpoints() -> Vec<EndpointConfig> {
    vec![
        EndpointConfig::http(
            "google",
            "https://www.google.com/generate_204",
            1.0,
            3000,
        ),
        EndpointConfig::http(
            "cloudflare",
            "https://www.cloudflare.com/cdn-cgi/trace",
            1.0,
            3000,
        ),
        EndpointConfig::http(
            "apple-captive",
            "http://captive.apple.com/hotspot-detect.html",
            0.8,
            4000,
        ),
        EndpointConfig::http(
            "msft-connecttest",
            "http://www.msftconnecttest.com/connecttest.txt",
            0.8,
            4000,
        ),
        EndpointConfig::tcp("cloudflare-ip", SocketAddr::from(([1, 1, 1, 1], 443)), 0.7, 2000),
        EndpointConfig::tcp("google-ip", SocketAddr::from(([8, 8, 8, 8], 443)), 0.7, 2000),
    ]
}
