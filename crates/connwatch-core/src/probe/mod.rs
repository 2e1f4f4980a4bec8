//! Comprehensive check and quality mapping
//!
//! The comprehensive check runs the basic, DNS and multi-endpoint checks
//! concurrently, each on its own task and each bounded by the same outer
//! ceiling. A check that errors, panics or outlives the ceiling becomes a
//! failed [`ProbeResult`]; the others are unaffected.

use crate::state::NetworkQuality;
use crate::traits::{ConnectivityProbe, ProbeResult, ProbeResults};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Map a verdict, confidence and average latency to a quality class
///
/// | confidence | latency   | quality   |
/// |------------|-----------|-----------|
/// | > 0.8      | < 100 ms  | excellent |
/// | > 0.6      | < 300 ms  | good      |
/// | > 0.4      | < 1000 ms | fair      |
/// | otherwise, online     || poor      |
/// | otherwise, offline    || offline   |
///
/// Missing latency never qualifies for the upper classes.
pub fn quality_for(success: bool, confidence: f64, avg_latency_ms: Option<f64>) -> NetworkQuality {
    if !success {
        return NetworkQuality::Offline;
    }

    let latency = avg_latency_ms.unwrap_or(f64::INFINITY);
    if confidence > 0.8 && latency < 100.0 {
        NetworkQuality::Excellent
    } else if confidence > 0.6 && latency < 300.0 {
        NetworkQuality::Good
    } else if confidence > 0.4 && latency < 1000.0 {
        NetworkQuality::Fair
    } else {
        NetworkQuality::Poor
    }
}

/// Run all three checks concurrently under one ceiling
pub async fn run_comprehensive_check(
    probe: Arc<dyn ConnectivityProbe>,
    ceiling: Duration,
) -> ProbeResults {
    let basic = {
        let probe = Arc::clone(&probe);
        bounded("basic", ceiling, async move { probe.basic_check().await })
    };
    let dns = {
        let probe = Arc::clone(&probe);
        bounded("dns", ceiling, async move { probe.dns_check().await })
    };
    let multi_endpoint = {
        let probe = Arc::clone(&probe);
        bounded("multi_endpoint", ceiling, async move {
            probe.multi_endpoint_check().await
        })
    };

    let (basic, dns, multi_endpoint) = tokio::join!(basic, dns, multi_endpoint);
    debug!(
        "Comprehensive check via {}: basic={} dns={} multi_endpoint={} (confidence {:?})",
        probe.probe_name(),
        basic.success,
        dns.success,
        multi_endpoint.success,
        multi_endpoint.confidence
    );

    ProbeResults {
        basic,
        dns,
        multi_endpoint,
    }
}

/// Run one check on its own task, converting every failure mode to evidence
async fn bounded<F>(name: &'static str, ceiling: Duration, check: F) -> ProbeResult
where
    F: Future<Output = crate::Result<ProbeResult>> + Send + 'static,
{
    let mut task = AbortOnDrop(tokio::spawn(check));

    match tokio::time::timeout(ceiling, &mut task.0).await {
        Ok(Ok(Ok(result))) => sanitize(result),
        Ok(Ok(Err(e))) => {
            debug!("{} check failed: {}", name, e);
            ProbeResult::failed(e.to_string())
        }
        Ok(Err(join_error)) => {
            debug!("{} check aborted: {}", name, join_error);
            ProbeResult::failed(format!("{} check aborted: {}", name, join_error))
        }
        Err(_) => {
            debug!("{} check exceeded {:?}", name, ceiling);
            ProbeResult::failed(format!("{} check exceeded {:?}", name, ceiling))
        }
    }
}

/// Aborts the check when the comprehensive check is dropped or times out
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Keep confidence inside `[0, 1]` whatever the implementation reported
fn sanitize(mut result: ProbeResult) -> ProbeResult {
    result.confidence = result.confidence.map(|c| {
        if c.is_nan() {
            0.0
        } else {
            c.clamp(0.0, 1.0)
        }
    });
    result
}
