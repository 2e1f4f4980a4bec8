// # connwatch-core
//
// Core library for the connwatch connectivity and quality detection engine.
//
// ## Architecture Overview
//
// This library owns the canonical network state and everything that decides
// how it changes:
// - **ConnectivityProbe**: Trait for the three connectivity checks (basic, DNS, multi-endpoint)
// - **PlatformAdapter**: Trait for per-OS native change sources (interfaces, VPN, Wi-Fi)
// - **InterfaceSource**: Trait for enumerating local interfaces and their addresses
// - **InterfaceDifferencer**: Diffs interface snapshots and classifies significance
// - **ConnectivityMonitor**: The state aggregator that debounces signals, runs
//   comprehensive checks and publishes state-change events
//
// ## Design Principles
//
// 1. **Single Writer**: Only the monitor mutates `NetworkState`; readers get copies
// 2. **Event-Driven**: Raw signals flow in as streams, state changes flow out on a broadcast channel
// 3. **Failure Containment**: Probes and adapters report failure as evidence, never as panics
// 4. **Library-First**: Concrete probes and adapters live in their own crates and are injected

pub mod config;
pub mod engine;
pub mod error;
pub mod interfaces;
pub mod probe;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{EngineConfig, MonitorConfig, ProbeConfig};
pub use engine::{ConnectivityMonitor, MonitorEvent};
pub use error::{Error, Result};
pub use interfaces::{InterfaceChange, InterfaceChangeKind, InterfaceDifferencer};
pub use state::{NetworkQuality, NetworkState, StateChangeEntry};
pub use traits::{ConnectivityProbe, InterfaceSource, PlatformAdapter, PlatformEvent};
