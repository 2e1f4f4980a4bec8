// # Network Probes
//
// This crate provides the real-network `ConnectivityProbe` for connwatch.
//
// ## Checks
//
// - **Basic**: one HEAD request to a low-latency endpoint. Any HTTP response
//   counts as connected; only transport failures do not.
// - **DNS**: every configured domain against every configured public resolver,
//   as raw UDP queries so the host's resolver cache cannot answer for a dead
//   network.
// - **Multi-endpoint**: weighted HTTP(S) and raw TCP targets, each with its
//   own timeout, all concurrently.
//
// Unreachable targets are evidence, not errors. Every check returns
// `Ok(ProbeResult)` unless the check itself could not be set up.

mod dns;
mod endpoint;

use connwatch_core::config::ProbeConfig;
use connwatch_core::traits::{ConnectivityProbe, ProbeResult};
use connwatch_core::{Error, Result};
use std::time::Instant;
use tracing::debug;

pub use dns::{build_query, query_resolves};

/// Real-network connectivity probe
pub struct NetworkProbes {
    config: ProbeConfig,

    /// Shared HTTP client (redirects are not followed; a redirect is a response)
    client: reqwest::Client,
}

impl NetworkProbes {
    /// Create probes from configuration
    ///
    /// # Errors
    ///
    /// - Invalid probe configuration
    /// - HTTP client could not be built (e.g. TLS backend unavailable)
    pub fn new(config: ProbeConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("connwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::probe("http", format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl ConnectivityProbe for NetworkProbes {
    async fn basic_check(&self) -> Result<ProbeResult> {
        let url = &self.config.basic_url;
        let started = Instant::now();

        let response = self
            .client
            .head(url)
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .timeout(self.config.basic_timeout())
            .send()
            .await;

        Ok(match response {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!("Basic check {} -> {}", url, status);
                ProbeResult::basic(url, Some(status), Some(elapsed_ms(started)), None)
            }
            Err(e) => {
                debug!("Basic check {} failed: {}", url, e);
                ProbeResult::basic(url, None, None, Some(describe_http_error(&e)))
            }
        })
    }

    async fn dns_check(&self) -> Result<ProbeResult> {
        let attempts = dns::resolve_all(
            &self.config.dns_domains,
            &self.config.dns_resolvers,
            self.config.dns_timeout(),
        )
        .await;

        let result = ProbeResult::from_dns_attempts(attempts);
        debug!(
            "DNS check: success={} rate={:?}",
            result.success, result.confidence
        );
        Ok(result)
    }

    async fn multi_endpoint_check(&self) -> Result<ProbeResult> {
        let outcomes = endpoint::probe_all(&self.client, &self.config.endpoints).await;
        Ok(ProbeResult::from_endpoint_outcomes(outcomes))
    }

    fn probe_name(&self) -> &'static str {
        "network"
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

pub(crate) fn describe_http_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "timed out".to_string()
    } else if e.is_connect() {
        format!("connect failed: {}", e)
    } else {
        e.to_string()
    }
}
