//! Outbound service client middleware.
//!
//! # Responsibilities
//! - Identify this service on outbound calls through `User-Agent`
//! - Propagate the inbound transaction ID to downstream services
//!
//! Headers the caller set explicitly are never overridden, including an
//! empty `User-Agent`.
//!
//! ```rust,ignore
//! let client = hyper_util::client::legacy::Client::builder(TokioExecutor::new())
//!     .build_http::<Body>();
//! let client = ServiceBuilder::new()
//!     .layer(ServiceClientLayer::new("content-api", "1.4.0", "https://runbooks.example/content-api")?)
//!     .service(client);
//! ```

use std::task::{Context, Poll};

use axum::http::header::USER_AGENT;
use axum::http::{HeaderValue, Request};
use tower::{Layer, Service};

use crate::http::request::{TransactionId, TRANSACTION_ID_HEADER};

/// Errors building a service client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid User-Agent value: {0:?}")]
    InvalidUserAgent(String),
}

/// Layer adding service identification and transaction propagation headers.
#[derive(Debug, Clone)]
pub struct ServiceClientLayer {
    user_agent: HeaderValue,
}

impl ServiceClientLayer {
    /// `User-Agent` becomes `<code>/<version>`, or `<code>/<version> (+<runbook>)`
    /// when `runbook` is non-empty.
    pub fn new(
        service_code: &str,
        version: &str,
        runbook: &str,
    ) -> Result<Self, ClientError> {
        let agent = if runbook.is_empty() {
            format!("{service_code}/{version}")
        } else {
            format!("{service_code}/{version} (+{runbook})")
        };
        let user_agent =
            HeaderValue::from_str(&agent).map_err(|_| ClientError::InvalidUserAgent(agent))?;
        Ok(Self { user_agent })
    }

    pub fn user_agent(&self) -> &HeaderValue {
        &self.user_agent
    }
}

impl<S> Layer<S> for ServiceClientLayer {
    type Service = ServiceClient<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ServiceClient {
            inner,
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Outbound service wrapped by [`ServiceClientLayer`].
#[derive(Debug, Clone)]
pub struct ServiceClient<S> {
    inner: S,
    user_agent: HeaderValue,
}

impl<S, B> Service<Request<B>> for ServiceClient<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        if !req.headers().contains_key(USER_AGENT) {
            req.headers_mut()
                .insert(USER_AGENT, self.user_agent.clone());
        }

        if !req.headers().contains_key(&TRANSACTION_ID_HEADER) {
            let tid = req
                .extensions()
                .get::<TransactionId>()
                .and_then(|tid| HeaderValue::from_str(tid.as_str()).ok());
            if let Some(tid) = tid {
                req.headers_mut().insert(TRANSACTION_ID_HEADER.clone(), tid);
            }
        }

        self.inner.call(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::{service_fn, ServiceExt};

    type Seen = Vec<(String, String)>;

    async fn send(layer: ServiceClientLayer, req: Request<()>) -> axum::http::HeaderMap {
        let client = layer.layer(service_fn(|req: Request<()>| async move {
            Ok::<_, Infallible>(req.headers().clone())
        }));
        client.oneshot(req).await.unwrap()
    }

    fn expect(headers: &axum::http::HeaderMap, expected: Seen) {
        for (name, value) in expected {
            let actual = headers
                .get(name.as_str())
                .map(|v| v.to_str().unwrap().to_string());
            assert_eq!(actual.as_deref(), Some(value.as_str()), "header {name}");
        }
    }

    fn seen(pairs: &[(&str, &str)]) -> Seen {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_sets_agent_with_runbook() {
        let layer = ServiceClientLayer::new("service", "v1.0", "runbook.com").unwrap();
        let headers = send(layer, Request::new(())).await;
        expect(&headers, seen(&[("user-agent", "service/v1.0 (+runbook.com)")]));
    }

    #[tokio::test]
    async fn test_sets_agent_without_runbook() {
        let layer = ServiceClientLayer::new("service", "v1.0", "").unwrap();
        let headers = send(layer, Request::new(())).await;
        expect(&headers, seen(&[("user-agent", "service/v1.0")]));
        assert!(headers.get(&TRANSACTION_ID_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_keeps_caller_agent() {
        let layer = ServiceClientLayer::new("service", "v1.0", "runbook.com").unwrap();
        for agent in ["test-agent", ""] {
            let req = Request::builder()
                .header("User-Agent", agent)
                .body(())
                .unwrap();
            let headers = send(layer.clone(), req).await;
            expect(&headers, seen(&[("user-agent", agent)]));
        }
    }

    #[tokio::test]
    async fn test_propagates_transaction_id_from_extensions() {
        let layer = ServiceClientLayer::new("service", "v1.0", "").unwrap();
        let mut req = Request::new(());
        req.extensions_mut().insert(TransactionId::new("tid_test"));
        let headers = send(layer, req).await;
        expect(
            &headers,
            seen(&[("user-agent", "service/v1.0"), ("x-request-id", "tid_test")]),
        );
    }

    #[tokio::test]
    async fn test_keeps_request_transaction_id() {
        let layer = ServiceClientLayer::new("service", "v1.0", "").unwrap();
        let mut req = Request::builder()
            .header("X-Request-Id", "tid_request")
            .body(())
            .unwrap();
        req.extensions_mut().insert(TransactionId::new("tid_test"));
        let headers = send(layer, req).await;
        expect(&headers, seen(&[("x-request-id", "tid_request")]));
    }

    #[test]
    fn test_rejects_unprintable_agent() {
        let err = ServiceClientLayer::new("svc\n", "1", "").unwrap_err();
        assert!(matches!(err, ClientError::InvalidUserAgent(_)));
    }
}
