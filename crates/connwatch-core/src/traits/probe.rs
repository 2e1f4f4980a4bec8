// # Connectivity Probe Trait
//
// Defines the three independent connectivity checks and the envelope their
// results share.
//
// ## Implementations
//
// - HTTP/TCP/DNS over the real network: `connwatch-probes` crate
// - Scripted doubles: `tests/common` of this crate
//
// ## Usage
//
// ```rust,ignore
// use connwatch_core::ConnectivityProbe;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let probe = /* ConnectivityProbe implementation */;
//
//     let result = probe.multi_endpoint_check().await?;
//     println!("confidence: {:?}", result.confidence);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Multi-endpoint checks succeed when confidence is strictly above this
pub const MULTI_ENDPOINT_SUCCESS_THRESHOLD: f64 = 0.3;

/// Outcome of one check, in the envelope shared by all three strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Whether the check considers the network reachable
    pub success: bool,
    /// Fraction of evidence in favour, in `[0, 1]`, when the strategy computes one
    pub confidence: Option<f64>,
    /// Latency (average over successes for multi-sample strategies)
    pub response_time_ms: Option<f64>,
    /// Strategy-specific detail
    pub evidence: ProbeEvidence,
}

/// Strategy-specific probe detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeEvidence {
    /// Single request to one endpoint
    Basic {
        url: String,
        status: Option<u16>,
        error: Option<String>,
    },
    /// Every domain × resolver combination that was tried
    Dns {
        attempts: Vec<DnsAttempt>,
        success_rate: f64,
    },
    /// Every weighted endpoint that was tried
    MultiEndpoint { outcomes: Vec<EndpointOutcome> },
    /// The check did not produce evidence (error, panic or ceiling hit)
    Failed { reason: String },
}

/// One DNS resolution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsAttempt {
    pub domain: String,
    pub resolver: SocketAddr,
    pub resolved: bool,
    pub response_time_ms: Option<f64>,
    pub error: Option<String>,
}

/// One weighted endpoint outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointOutcome {
    pub name: String,
    pub weight: f64,
    pub success: bool,
    pub response_time_ms: Option<f64>,
    pub error: Option<String>,
}

impl ProbeResult {
    /// A check that produced no evidence
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            confidence: Some(0.0),
            response_time_ms: None,
            evidence: ProbeEvidence::Failed {
                reason: reason.into(),
            },
        }
    }

    /// Result of the basic check
    ///
    /// Any HTTP status counts as connected; only transport failures do not.
    pub fn basic(
        url: impl Into<String>,
        status: Option<u16>,
        response_time_ms: Option<f64>,
        error: Option<String>,
    ) -> Self {
        let success = status.is_some();
        Self {
            success,
            confidence: Some(if success { 1.0 } else { 0.0 }),
            response_time_ms: if success { response_time_ms } else { None },
            evidence: ProbeEvidence::Basic {
                url: url.into(),
                status,
                error,
            },
        }
    }

    /// Result of the DNS check: success if any combination resolved
    pub fn from_dns_attempts(attempts: Vec<DnsAttempt>) -> Self {
        let resolved: Vec<&DnsAttempt> = attempts.iter().filter(|a| a.resolved).collect();
        let success_rate = if attempts.is_empty() {
            0.0
        } else {
            resolved.len() as f64 / attempts.len() as f64
        };

        Self {
            success: !resolved.is_empty(),
            confidence: Some(success_rate),
            response_time_ms: average(resolved.iter().filter_map(|a| a.response_time_ms)),
            evidence: ProbeEvidence::Dns {
                attempts,
                success_rate,
            },
        }
    }

    /// Result of the multi-endpoint check
    ///
    /// `confidence = Σ weight(succeeded) / Σ weight(all)`.
    pub fn from_endpoint_outcomes(outcomes: Vec<EndpointOutcome>) -> Self {
        let total: f64 = outcomes.iter().map(|o| o.weight.max(0.0)).sum();
        let succeeded: f64 = outcomes
            .iter()
            .filter(|o| o.success)
            .map(|o| o.weight.max(0.0))
            .sum();

        let confidence = if total > 0.0 {
            (succeeded / total).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            success: confidence > MULTI_ENDPOINT_SUCCESS_THRESHOLD,
            confidence: Some(confidence),
            response_time_ms: average(
                outcomes
                    .iter()
                    .filter(|o| o.success)
                    .filter_map(|o| o.response_time_ms),
            ),
            evidence: ProbeEvidence::MultiEndpoint { outcomes },
        }
    }
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Results of one comprehensive check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResults {
    pub basic: ProbeResult,
    pub dns: ProbeResult,
    pub multi_endpoint: ProbeResult,
}

impl ProbeResults {
    /// All three checks failed for the same reason
    pub fn all_failed(reason: &str) -> Self {
        Self {
            basic: ProbeResult::failed(reason),
            dns: ProbeResult::failed(reason),
            multi_endpoint: ProbeResult::failed(reason),
        }
    }
}

/// Trait for connectivity probe implementations
///
/// Each method runs one check strategy and must be side-effect-free and
/// bounded by its own timeouts.
///
/// # Failure Reporting
///
/// Unreachable targets are not errors: they are evidence and belong in an
/// `Ok(ProbeResult)` with `success: false`. Return `Err` only when the check
/// itself could not run (e.g. the HTTP client could not be built). The
/// comprehensive check turns errors, panics and ceiling overruns into failed
/// results, so nothing here can bring the monitor down.
///
/// # Thread Safety
///
/// Implementations must be thread-safe; the three checks run concurrently.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Single reachability request to a well-known low-latency endpoint
    async fn basic_check(&self) -> Result<ProbeResult, crate::Error>;

    /// Resolve the configured domains against the configured public resolvers
    async fn dns_check(&self) -> Result<ProbeResult, crate::Error>;

    /// Probe the weighted endpoint list and compute confidence and latency
    async fn multi_endpoint_check(&self) -> Result<ProbeResult, crate::Error>;

    /// Probe name (for logging/debugging)
    fn probe_name(&self) -> &'static str;
}
