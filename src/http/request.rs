//! Transaction ID and request metadata.
//!
//! # Responsibilities
//! - Read the transaction ID from inbound requests
//! - Generate a fresh ID when none was sent
//! - Carry the resolved ID to downstream handlers through request extensions
//! - Carry the client's remote address independently of the transport
//!
//! # Design Decisions
//! - The header name and the context key are distinct: downstream code looks
//!   the ID up by type (`req.extensions().get::<TransactionId>()`)
//! - Generation is injected through [`TransactionIdGenerator`]

use std::fmt;
use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue, Request};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Header carrying the transaction ID, inbound and outbound.
pub static TRANSACTION_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Opaque token linking log records across services for one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// ID sent by the client, if the header is present and non-empty.
    pub fn from_request<B>(req: &Request<B>) -> Option<Self> {
        req.headers()
            .get(&TRANSACTION_ID_HEADER)
            .filter(|v| !v.is_empty())
            .map(Self::from_header_value)
    }

    /// ID carried by a header value. Bytes that are not UTF-8 are replaced,
    /// everything else is kept as sent.
    pub fn from_header_value(value: &HeaderValue) -> Self {
        Self(String::from_utf8_lossy(value.as_bytes()).into_owned())
    }

    /// ID previously attached to the request by the logging handler.
    pub fn from_extensions<B>(req: &Request<B>) -> Option<&Self> {
        req.extensions().get::<Self>()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TransactionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Source of fresh transaction IDs.
pub trait TransactionIdGenerator: Send + Sync + 'static {
    fn generate(&self) -> TransactionId;
}

impl<F> TransactionIdGenerator for F
where
    F: Fn() -> String + Send + Sync + 'static,
{
    fn generate(&self) -> TransactionId {
        TransactionId(self())
    }
}

/// Default generator: `tid_` followed by ten random lowercase alphanumerics.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTransactionIds;

const RANDOM_SUFFIX_LEN: usize = 10;

impl TransactionIdGenerator for RandomTransactionIds {
    fn generate(&self) -> TransactionId {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RANDOM_SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        TransactionId(format!("tid_{suffix}"))
    }
}

/// Client address as reported by the transport, e.g. `10.0.0.1:5123`.
///
/// Kept as a string so addresses without a port (or from proxies) survive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddr(pub String);

impl From<SocketAddr> for RemoteAddr {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl RemoteAddr {
    /// Host part with any port suffix removed. Addresses that do not
    /// split as `host:port` are returned unchanged.
    pub fn host(&self) -> &str {
        split_host_port(&self.0).unwrap_or(&self.0)
    }
}

/// Split `host:port` or `[host]:port`, returning the host.
fn split_host_port(addr: &str) -> Option<&str> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        tail.strip_prefix(':')?;
        return Some(host);
    }
    let (host, _port) = addr.rsplit_once(':')?;
    if host.contains(':') {
        // Unbracketed IPv6 literal.
        return None;
    }
    Some(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_reads_header() {
        let req = Request::builder()
            .header("X-Request-Id", "tid_known")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            TransactionId::from_request(&req),
            Some(TransactionId::new("tid_known"))
        );
    }

    #[test]
    fn test_empty_header_is_absent() {
        let req = Request::builder()
            .header("x-request-id", "")
            .body(Body::empty())
            .unwrap();
        assert_eq!(TransactionId::from_request(&req), None);
    }

    #[test]
    fn test_header_outside_visible_ascii_is_kept() {
        let req = Request::builder()
            .header("x-request-id", HeaderValue::from_bytes(b"tid caf\xe9").unwrap())
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            TransactionId::from_request(&req),
            Some(TransactionId::new("tid caf\u{fffd}"))
        );

        let req = Request::builder()
            .header("x-request-id", "tid_caf\u{e9}")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            TransactionId::from_request(&req).map(|tid| tid.to_string()),
            Some("tid_caf\u{e9}".to_string())
        );
    }

    #[test]
    fn test_random_ids() {
        let a = RandomTransactionIds.generate();
        let b = RandomTransactionIds.generate();
        assert!(a.as_str().starts_with("tid_"));
        assert_eq!(a.as_str().len(), 4 + RANDOM_SUFFIX_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn test_closure_generator() {
        let generator = || "fixed".to_string();
        assert_eq!(generator.generate().as_str(), "fixed");
    }

    #[test]
    fn test_remote_host() {
        let cases = [
            ("192.168.100.11", "192.168.100.11"),
            ("localhost:8080", "localhost"),
            ("10.0.0.1:443", "10.0.0.1"),
            ("[::1]:8080", "::1"),
            ("::1", "::1"),
            ("[::1]", "[::1]"),
            ("", ""),
        ];
        for (addr, expected) in cases {
            assert_eq!(RemoteAddr(addr.to_string()).host(), expected, "addr {addr:?}");
        }
    }

    #[test]
    fn test_remote_from_socket_addr() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(RemoteAddr::from(addr).host(), "127.0.0.1");
    }
}
