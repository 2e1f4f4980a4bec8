//! Weighted multi-endpoint reachability

use connwatch_core::config::{EndpointConfig, EndpointTarget};
use connwatch_core::traits::EndpointOutcome;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::debug;

/// Probe every endpoint concurrently, each under its own timeout
///
/// Outcomes come back in configuration order.
pub(crate) async fn probe_all(
    client: &reqwest::Client,
    endpoints: &[EndpointConfig],
) -> Vec<EndpointOutcome> {
    let mut set = JoinSet::new();
    for (index, endpoint) in endpoints.iter().enumerate() {
        let client = client.clone();
        let endpoint = endpoint.clone();
        set.spawn(async move { (index, probe_endpoint(&client, &endpoint).await) });
    }

    let mut slots: Vec<Option<EndpointOutcome>> = vec![None; endpoints.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(e) => debug!("Endpoint probe task failed: {}", e),
        }
    }

    // A task that died still counts against the total weight
    slots
        .into_iter()
        .zip(endpoints)
        .map(|(slot, endpoint)| {
            slot.unwrap_or_else(|| failed(endpoint, "probe task aborted".to_string()))
        })
        .collect()
}

async fn probe_endpoint(client: &reqwest::Client, endpoint: &EndpointConfig) -> EndpointOutcome {
    let started = Instant::now();
    let result = match &endpoint.target {
        EndpointTarget::Http { url } => http_reachable(client, url, endpoint.timeout()).await,
        EndpointTarget::Tcp { addr } => tcp_reachable(*addr, endpoint.timeout()).await,
    };

    match result {
        Ok(()) => {
            let latency = crate::elapsed_ms(started);
            debug!("Endpoint {} reachable in {:.1} ms", endpoint.name, latency);
            EndpointOutcome {
                name: endpoint.name.clone(),
                weight: endpoint.weight,
                success: true,
                response_time_ms: Some(latency),
                error: None,
            }
        }
        Err(reason) => {
            debug!("Endpoint {} unreachable: {}", endpoint.name, reason);
            failed(endpoint, reason)
        }
    }
}

fn failed(endpoint: &EndpointConfig, reason: String) -> EndpointOutcome {
    EndpointOutcome {
        name: endpoint.name.clone(),
        weight: endpoint.weight,
        success: false,
        response_time_ms: None,
        error: Some(reason),
    }
}

async fn http_reachable(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<(), String> {
    client
        .head(url)
        .header(reqwest::header::CACHE_CONTROL, "no-cache")
        .timeout(timeout)
        .send()
        .await
        .map(|_| ())
        .map_err(|e| crate::describe_http_error(&e))
}

async fn tcp_reachable(addr: SocketAddr, timeout: Duration) -> Result<(), String> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(format!("connect failed: {}", e)),
        Err(_) => Err(format!("timed out after {:?}", timeout)),
    }
}
