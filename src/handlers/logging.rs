//! Transaction-aware request logging.
//!
//! # Responsibilities
//! - Resolve the transaction ID (inbound `X-Request-Id` or a fresh one)
//! - Echo it on the response and expose it to downstream handlers
//! - Observe the downstream response through a [`ResponseTracker`]
//! - Emit exactly one access log record per completed request
//!
//! # Data Flow
//! ```text
//! request
//!     → resolve TransactionId → response header + request extension
//!     → snapshot request metadata (redacted headers, target, client)
//!     → ResponseTracker wraps the sink → downstream handler (timed)
//!     → access record: status, size, responsetime, uuids
//! ```
//!
//! # Design Decisions
//! - Request metadata is captured before the request moves downstream
//! - No record is written when the downstream handler panics
//! - Nothing is captured when the logger would drop the record anyway

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::header::{HOST, REFERER, USER_AGENT};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri, Version};
use serde::Serialize;
use tracing::Level;

use crate::http::handler::Handler;
use crate::http::request::{
    RandomTransactionIds, RemoteAddr, TransactionId, TransactionIdGenerator,
    TRANSACTION_ID_HEADER,
};
use crate::http::tracker::ResponseTracker;
use crate::http::writer::ResponseWriter;
use crate::observability::identifiers::uuids_in;
use crate::observability::logger::Logger;
use crate::security::headers::{DenyList, RedactionPolicy};

/// Severity of access log records.
const ACCESS_LOG_LEVEL: Level = Level::INFO;

/// Logs every request that passes through it, in structured form.
pub struct TransactionAwareRequestLoggingHandler<H> {
    logger: Logger,
    next: H,
    policy: RedactionPolicy,
    ids: Arc<dyn TransactionIdGenerator>,
}

impl<H: Handler> TransactionAwareRequestLoggingHandler<H> {
    /// Log requests served by `next`, redacting the basic deny-list.
    pub fn new(logger: Logger, next: H) -> Self {
        Self {
            logger,
            next,
            policy: RedactionPolicy::new(DenyList::basic()),
            ids: Arc::new(RandomTransactionIds),
        }
    }

    /// Never log these request headers, in addition to the deny-list.
    pub fn filter_headers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.policy = self.policy.with_denied_headers(names);
        self
    }

    /// Never log headers for which `denied` returns `true`.
    pub fn with_header_predicate<F>(mut self, denied: F) -> Self
    where
        F: Fn(&HeaderName) -> bool + Send + Sync + 'static,
    {
        self.policy = self.policy.with_predicate(denied);
        self
    }

    /// Replace the whole redaction policy.
    pub fn with_redaction_policy(mut self, policy: RedactionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Source of IDs for requests that arrive without one.
    pub fn with_id_generator(mut self, ids: impl TransactionIdGenerator) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    pub fn redaction_policy(&self) -> &RedactionPolicy {
        &self.policy
    }
}

/// Shorthand for [`TransactionAwareRequestLoggingHandler::new`].
pub fn transaction_aware_request_logging_handler<H: Handler>(
    logger: Logger,
    next: H,
) -> TransactionAwareRequestLoggingHandler<H> {
    TransactionAwareRequestLoggingHandler::new(logger, next)
}

impl<H: Handler> Handler for TransactionAwareRequestLoggingHandler<H> {
    fn serve_http<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        mut req: Request<Body>,
    ) -> impl Future<Output = ()> + Send + 'a {
        async move {
            let inbound = req
                .headers()
                .get(&TRANSACTION_ID_HEADER)
                .filter(|v| !v.is_empty())
                .cloned();
            let (tid, echoed) = match inbound {
                Some(value) => (TransactionId::from_header_value(&value), Some(value)),
                None => {
                    let tid = self.ids.generate();
                    let value = HeaderValue::from_str(tid.as_str()).ok();
                    if value.is_none() {
                        tracing::warn!(transaction_id = %tid, "Transaction ID is not a valid header value");
                    }
                    (tid, value)
                }
            };
            if let Some(value) = echoed {
                w.headers_mut().insert(TRANSACTION_ID_HEADER.clone(), value);
            }
            req.extensions_mut().insert(tid.clone());

            let summary = self
                .logger
                .enabled(ACCESS_LOG_LEVEL)
                .then(|| RequestSummary::capture(&req, &self.policy));

            let mut tracker = ResponseTracker::new(w);
            let start = Instant::now();
            self.next.serve_http(&mut tracker, req).await;
            let elapsed = start.elapsed();

            if let Some(summary) = summary {
                write_request_log(
                    &self.logger,
                    &summary,
                    &tid,
                    elapsed,
                    tracker.status(),
                    tracker.size(),
                );
            }
        }
    }
}

/// Request metadata needed for the access record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RequestSummary {
    host: String,
    username: String,
    method: String,
    uri: String,
    protocol: String,
    referer: String,
    user_agent: String,
    headers: Option<BTreeMap<String, String>>,
}

impl RequestSummary {
    pub(crate) fn capture<B>(req: &Request<B>, policy: &RedactionPolicy) -> Self {
        let host = req
            .extensions()
            .get::<RemoteAddr>()
            .map(|addr| addr.host().to_string())
            .unwrap_or_default();

        Self {
            host,
            username: username(req.uri()).to_string(),
            method: req.method().as_str().to_string(),
            uri: request_target(req),
            protocol: protocol(req.version()),
            referer: header_text(req.headers(), &REFERER),
            user_agent: header_text(req.headers(), &USER_AGENT),
            headers: policy.redact(req.headers()),
        }
    }
}

fn header_text(headers: &HeaderMap, name: &HeaderName) -> String {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default()
}

/// User name from the URI's userinfo, empty when absent.
fn username(uri: &Uri) -> &str {
    uri.authority()
        .and_then(|authority| authority.as_str().rsplit_once('@'))
        .map(|(userinfo, _)| userinfo.split(':').next().unwrap_or_default())
        .unwrap_or_default()
}

/// The request target as the client sent it.
///
/// Absolute-form targets are reduced to their path and query, so userinfo
/// in proxy-style requests never reaches the log. CONNECT requests name
/// their target by authority. Over HTTP/2 and later that is the
/// `:authority` pseudo-header, which may only surface as `Host`.
fn request_target<B>(req: &Request<B>) -> String {
    if req.method() == Method::CONNECT {
        if let Some(authority) = req.uri().authority() {
            return authority.to_string();
        }
        if req.version() >= Version::HTTP_2 {
            return header_text(req.headers(), &HOST);
        }
    }
    match req.uri().path_and_query() {
        Some(pq) if !pq.as_str().is_empty() => pq.to_string(),
        _ => "/".to_string(),
    }
}

fn protocol(version: Version) -> String {
    match version {
        Version::HTTP_09 => "HTTP/0.9".to_string(),
        Version::HTTP_10 => "HTTP/1.0".to_string(),
        Version::HTTP_11 => "HTTP/1.1".to_string(),
        Version::HTTP_2 => "HTTP/2.0".to_string(),
        Version::HTTP_3 => "HTTP/3.0".to_string(),
        other => format!("{other:?}"),
    }
}

#[derive(Serialize)]
struct AccessRecord<'r> {
    responsetime: u64,
    host: &'r str,
    username: &'r str,
    method: &'r str,
    transaction_id: &'r str,
    uri: &'r str,
    protocol: &'r str,
    status: u16,
    size: usize,
    referer: &'r str,
    #[serde(rename = "userAgent")]
    user_agent: &'r str,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<&'r BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uuid: Option<String>,
}

/// Write the access record for one request.
pub(crate) fn write_request_log(
    logger: &Logger,
    summary: &RequestSummary,
    tid: &TransactionId,
    response_time: Duration,
    status: Option<StatusCode>,
    size: usize,
) {
    let uuids = uuids_in(&summary.uri);
    let record = AccessRecord {
        responsetime: u64::try_from(response_time.as_millis()).unwrap_or(u64::MAX),
        host: &summary.host,
        username: &summary.username,
        method: &summary.method,
        transaction_id: tid.as_str(),
        uri: &summary.uri,
        protocol: &summary.protocol,
        status: status.map_or(0, |s| s.as_u16()),
        size,
        referer: &summary.referer,
        user_agent: &summary.user_agent,
        headers: summary.headers.as_ref(),
        uuid: (!uuids.is_empty()).then(|| uuids.join(",")),
    };

    logger.entry().with_serialized(&record).info("");
}
