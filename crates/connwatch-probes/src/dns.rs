//! Raw UDP DNS resolution against explicit resolvers

use connwatch_core::traits::DnsAttempt;
use connwatch_core::{Error, Result};
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RecordType};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tracing::debug;

/// Largest UDP response we accept
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

static QUERY_COUNTER: AtomicU16 = AtomicU16::new(0);

/// Query IDs only need to differ between concurrent queries
fn next_query_id() -> u16 {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0) as u16;
    seed ^ QUERY_COUNTER.fetch_add(0x9e37, Ordering::Relaxed)
}

/// Encode a recursive A query for `domain`
pub fn build_query(id: u16, domain: &str) -> Result<Vec<u8>> {
    let name = Name::from_str(domain)
        .map_err(|e| Error::probe("dns", format!("Invalid domain {}: {}", domain, e)))?;

    let mut message = Message::new();
    message.set_id(id);
    message.set_message_type(MessageType::Query);
    message.set_op_code(OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(Query::query(name, RecordType::A));

    message
        .to_vec()
        .map_err(|e| Error::probe("dns", format!("Failed to encode query: {}", e)))
}

/// Whether `response` answers query `id` with at least one A record
///
/// Returns `Err` with a reason for anything that is not a usable answer.
pub fn query_resolves(response: &[u8], id: u16) -> std::result::Result<bool, String> {
    let message =
        Message::from_vec(response).map_err(|e| format!("malformed response: {}", e))?;

    if message.id() != id {
        return Err(format!("unexpected response id {}", message.id()));
    }
    if message.message_type() != MessageType::Response {
        return Err("not a response".to_string());
    }
    if message.response_code() != ResponseCode::NoError {
        return Err(format!("response code {}", message.response_code()));
    }

    Ok(message
        .answers()
        .iter()
        .any(|record| record.record_type() == RecordType::A))
}

/// Resolve every domain against every resolver, concurrently
pub(crate) async fn resolve_all(
    domains: &[String],
    resolvers: &[SocketAddr],
    timeout: Duration,
) -> Vec<DnsAttempt> {
    let mut set = JoinSet::new();
    for domain in domains {
        for resolver in resolvers {
            let domain = domain.clone();
            let resolver = *resolver;
            set.spawn(async move { resolve(domain, resolver, timeout).await });
        }
    }

    let mut attempts = Vec::with_capacity(domains.len() * resolvers.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(attempt) => attempts.push(attempt),
            Err(e) => debug!("DNS attempt task failed: {}", e),
        }
    }
    attempts
}

async fn resolve(domain: String, resolver: SocketAddr, timeout: Duration) -> DnsAttempt {
    let started = Instant::now();
    let outcome = match tokio::time::timeout(timeout, exchange(&domain, resolver)).await {
        Ok(Ok(true)) => Ok(()),
        Ok(Ok(false)) => Err("no A records in answer".to_string()),
        Ok(Err(reason)) => Err(reason),
        Err(_) => Err(format!("timed out after {:?}", timeout)),
    };

    match outcome {
        Ok(()) => DnsAttempt {
            domain,
            resolver,
            resolved: true,
            response_time_ms: Some(crate::elapsed_ms(started)),
            error: None,
        },
        Err(reason) => {
            debug!("DNS {} via {} failed: {}", domain, resolver, reason);
            DnsAttempt {
                domain,
                resolver,
                resolved: false,
                response_time_ms: None,
                error: Some(reason),
            }
        }
    }
}

async fn exchange(domain: &str, resolver: SocketAddr) -> std::result::Result<bool, String> {
    let id = next_query_id();
    let query = build_query(id, domain).map_err(|e| e.to_string())?;

    let bind_addr = match resolver.ip() {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|e| format!("bind failed: {}", e))?;
    socket
        .connect(resolver)
        .await
        .map_err(|e| format!("connect failed: {}", e))?;
    socket
        .send(&query)
        .await
        .map_err(|e| format!("send failed: {}", e))?;

    let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
    loop {
        let len = socket
            .recv(&mut buf)
            .await
            .map_err(|e| format!("receive failed: {}", e))?;
        // Stray datagram from an earlier query on a reused port
        if len >= 2 && u16::from_be_bytes([buf[0], buf[1]]) != id {
            continue;
        }
        return query_resolves(&buf[..len], id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::{RData, Record};

    fn response_for(query: &[u8], code: ResponseCode, with_answer: bool) -> Vec<u8> {
        let request = Message::from_vec(query).unwrap();
        let mut response = Message::new();
        response.set_id(request.id());
        response.set_message_type(MessageType::Response);
        response.set_op_code(OpCode::Query);
        response.set_response_code(code);
        for q in request.queries() {
            response.add_query(q.clone());
        }
        if with_answer {
            let name = Name::from_str("example.com.").unwrap();
            response.add_answer(Record::from_rdata(
                name,
                300,
                RData::A(A(Ipv4Addr::new(93, 184, 216, 34))),
            ));
        }
        response.to_vec().unwrap()
    }

    #[test]
    fn test_query_shape() {
        let bytes = build_query(4242, "example.com").unwrap();
        let message = Message::from_vec(&bytes).unwrap();

        assert_eq!(message.id(), 4242);
        assert!(message.recursion_desired());
        assert_eq!(message.queries().len(), 1);
        assert_eq!(message.queries()[0].query_type(), RecordType::A);
    }

    #[test]
    fn test_answer_with_a_record_resolves() {
        let query = build_query(7, "example.com").unwrap();
        let response = response_for(&query, ResponseCode::NoError, true);
        assert_eq!(query_resolves(&response, 7), Ok(true));
    }

    #[test]
    fn test_empty_answer_does_not_resolve() {
        let query = build_query(7, "example.com").unwrap();
        let response = response_for(&query, ResponseCode::NoError, false);
        assert_eq!(query_resolves(&response, 7), Ok(false));
    }

    #[test]
    fn test_error_responses_are_rejected() {
        let query = build_query(9, "example.com").unwrap();

        let servfail = response_for(&query, ResponseCode::ServFail, false);
        assert!(query_resolves(&servfail, 9).is_err());

        let good = response_for(&query, ResponseCode::NoError, true);
        assert!(query_resolves(&good, 10).is_err(), "id mismatch");

        assert!(query_resolves(&[0x12, 0x34, 0x01], 9).is_err());
        assert!(query_resolves(&query, 9).is_err(), "a query is not a response");
    }

    #[tokio::test]
    async fn test_unreachable_resolver_is_evidence() {
        // TEST-NET-1 is never routed; the attempt must end in a failed record
        let resolver: SocketAddr = "192.0.2.1:53".parse().unwrap();
        let attempts = resolve_all(
            &["example.com".to_string(), "example.org".to_string()],
            &[resolver],
            Duration::from_millis(200),
        )
        .await;

        assert_eq!(attempts.len(), 2);
        assert!(attempts.iter().all(|a| !a.resolved && a.error.is_some()));
    }
}
