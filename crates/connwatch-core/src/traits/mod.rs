//! Core traits for the connwatch engine
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ConnectivityProbe`]: Run the basic, DNS and multi-endpoint checks
//! - [`PlatformAdapter`]: Stream native network/VPN/Wi-Fi change events
//! - [`InterfaceSource`]: Enumerate local interfaces and their addresses

pub mod interface_source;
pub mod platform;
pub mod probe;

pub use interface_source::{InterfaceSnapshot, InterfaceSource};
pub use platform::{NetworkChangeKind, PlatformAdapter, PlatformEvent, VpnSignal};
pub use probe::{
    ConnectivityProbe, DnsAttempt, EndpointOutcome, ProbeEvidence, ProbeResult, ProbeResults,
};
