//! HTTP server bridge.
//!
//! # Responsibilities
//! - Expose a [`Handler`] chain as a tower service for `axum::serve`
//! - Provide the streaming response sink handed to the outermost handler
//! - Adapt axum routers (or any infallible tower service) into downstream
//!   handlers
//! - Run the listener with a transport-level request timeout and graceful
//!   shutdown
//!
//! # Data Flow
//! ```text
//! hyper connection
//!     → HandlerService::call (spawns the handler chain)
//!     → StreamingResponseWriter (head via oneshot, body via mpsc)
//!     → Response<Body> streamed back to hyper
//! ```
//!
//! # Design Decisions
//! - The handler runs on its own task so the response head can be returned
//!   as soon as it is committed while the body keeps streaming
//! - The head is committed on the first write, flush, hijack, or when the
//!   handler returns
//! - A handler panic before the head was committed is re-raised on the
//!   service future; after that point the body ends with an error
//! - Dropping the service future before the head was committed (a request
//!   timeout) aborts the handler, so no access record is written for it

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::ServiceExt as _;
use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use http_body_util::BodyExt;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tower::{Service, ServiceBuilder, ServiceExt};
use tower_http::timeout::TimeoutLayer;

use crate::http::handler::Handler;
use crate::http::request::RemoteAddr;
use crate::http::writer::{
    CloseNotify, Flush, Hijack, HijackedConn, ResponseWriter, SinkError,
};

/// Buffered body bytes are pushed to the client once this much accumulates.
const FLUSH_THRESHOLD: usize = 8 * 1024;
const BODY_CHANNEL_CAPACITY: usize = 16;

/// Default transport-level deadline for a whole request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tower service running a [`Handler`] for every request.
pub struct HandlerService<H> {
    handler: Arc<H>,
}

impl<H> Clone for HandlerService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<H: Handler> HandlerService<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }
}

impl<H: Handler> Service<Request<Body>> for HandlerService<H> {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        if req.extensions().get::<RemoteAddr>().is_none() {
            if let Some(addr) = req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0)
            {
                req.extensions_mut().insert(RemoteAddr::from(addr));
            }
        }

        let on_upgrade = req.extensions_mut().remove::<OnUpgrade>();
        let (mut writer, head_rx, body) = StreamingResponseWriter::new(on_upgrade);
        let handler = self.handler.clone();

        let task = tokio::spawn(async move {
            handler.serve_http(&mut writer, req).await;
            writer.finish().await;
        });
        let mut abort = AbortOnDrop(Some(task.abort_handle()));

        Box::pin(async move {
            let head = head_rx.await;
            abort.disarm();
            match head {
                Ok(head) => Ok(head.into_response(body)),
                Err(_) => {
                    if let Err(err) = task.await {
                        if err.is_panic() {
                            std::panic::resume_unwind(err.into_panic());
                        }
                    }
                    Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response())
                }
            }
        })
    }
}

/// Aborts the handler task when the service future is dropped before the
/// response head arrives, e.g. when a request timeout fires.
struct AbortOnDrop(Option<AbortHandle>);

impl AbortOnDrop {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

struct ResponseHead {
    status: StatusCode,
    headers: HeaderMap,
}

impl ResponseHead {
    fn into_response(self, body: Body) -> Response {
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Channel-backed sink feeding a streaming [`Body`].
///
/// Supports flush and close notification always, and hijack when hyper
/// attached an upgrade handle to the request.
struct StreamingResponseWriter {
    headers: HeaderMap,
    status: Option<StatusCode>,
    head_tx: Option<oneshot::Sender<ResponseHead>>,
    body_tx: mpsc::Sender<io::Result<Bytes>>,
    buffer: BytesMut,
    on_upgrade: Option<OnUpgrade>,
    finished: bool,
}

impl StreamingResponseWriter {
    fn new(on_upgrade: Option<OnUpgrade>) -> (Self, oneshot::Receiver<ResponseHead>, Body) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);

        let stream = futures_util::stream::unfold(body_rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });

        let writer = Self {
            headers: HeaderMap::new(),
            status: None,
            head_tx: Some(head_tx),
            body_tx,
            buffer: BytesMut::with_capacity(FLUSH_THRESHOLD),
            on_upgrade,
            finished: false,
        };
        (writer, head_rx, Body::from_stream(stream))
    }

    /// Hand the head to the service future, once.
    fn commit(&mut self) -> Result<(), SinkError> {
        let Some(head_tx) = self.head_tx.take() else {
            return Ok(());
        };
        let head = ResponseHead {
            status: self.status.unwrap_or(StatusCode::OK),
            headers: std::mem::take(&mut self.headers),
        };
        head_tx
            .send(head)
            .map_err(|_| SinkError::Closed { written: 0 })
    }

    async fn send_buffered(&mut self) -> Result<(), SinkError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = self.buffer.split().freeze();
        self.body_tx
            .send(Ok(chunk))
            .await
            .map_err(|_| SinkError::Closed { written: 0 })
    }

    async fn finish(&mut self) {
        if self.commit().is_ok() {
            let _ = self.send_buffered().await;
        }
        self.finished = true;
    }
}

impl Drop for StreamingResponseWriter {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.body_tx.try_send(Err(io::Error::other(
                "handler ended without finishing the response",
            )));
        }
    }
}

impl ResponseWriter for StreamingResponseWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) -> Result<(), SinkError> {
        if self.head_tx.is_none() {
            return Err(SinkError::HeadersSent);
        }
        match self.status {
            Some(current) => {
                tracing::warn!(current = %current, ignored = %status, "Superfluous write_status call");
            }
            None => self.status = Some(status),
        }
        Ok(())
    }

    fn write<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, Result<usize, SinkError>> {
        Box::pin(async move {
            self.status.get_or_insert(StatusCode::OK);
            self.commit()?;
            if self.body_tx.is_closed() {
                return Err(SinkError::Closed { written: 0 });
            }
            self.buffer.extend_from_slice(buf);
            if self.buffer.len() >= FLUSH_THRESHOLD {
                self.send_buffered()
                    .await
                    .map_err(|_| SinkError::Closed { written: buf.len() })?;
            }
            Ok(buf.len())
        })
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        Some(self)
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        if self.on_upgrade.is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn close_notifier(&mut self) -> Option<&mut dyn CloseNotify> {
        Some(self)
    }
}

impl Flush for StreamingResponseWriter {
    fn flush(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            self.status.get_or_insert(StatusCode::OK);
            self.commit()?;
            self.send_buffered().await
        })
    }
}

impl Hijack for StreamingResponseWriter {
    fn hijack(&mut self) -> BoxFuture<'_, Result<HijackedConn, SinkError>> {
        Box::pin(async move {
            if self.head_tx.is_none() {
                return Err(SinkError::HeadersSent);
            }
            let on_upgrade = self
                .on_upgrade
                .take()
                .ok_or(SinkError::Unsupported("hijack"))?;
            self.status = Some(StatusCode::SWITCHING_PROTOCOLS);
            self.commit()?;
            let upgraded = on_upgrade.await?;
            Ok(Box::new(TokioIo::new(upgraded)) as HijackedConn)
        })
    }
}

impl CloseNotify for StreamingResponseWriter {
    fn closed(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.body_tx.closed().await })
    }
}

/// Adapts an infallible tower service (typically an axum `Router`) into a
/// downstream [`Handler`].
///
/// The service's response status and headers are written to the sink and
/// its body is streamed frame by frame, flushing after each frame when the
/// sink supports it. Trailers are dropped. Protocol upgrades performed by
/// the wrapped service are not supported; use [`Hijack`] directly instead.
#[derive(Debug, Clone)]
pub struct ServiceHandler<S> {
    inner: S,
}

impl<S> ServiceHandler<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S> Handler for ServiceHandler<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send,
{
    fn serve_http<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        req: Request<Body>,
    ) -> impl Future<Output = ()> + Send + 'a {
        let service = self.inner.clone();
        async move {
            let response = match service.oneshot(req).await {
                Ok(response) => response,
                Err(never) => match never {},
            };
            let (parts, mut body) = response.into_parts();

            w.headers_mut().extend(parts.headers);
            if let Err(err) = w.write_status(parts.status) {
                tracing::debug!(error = %err, "Could not set response status");
            }

            while let Some(frame) = body.frame().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::warn!(error = %err, "Response body stream failed");
                        break;
                    }
                };
                let Ok(data) = frame.into_data() else {
                    continue;
                };
                if let Err(err) = w.write(&data).await {
                    tracing::debug!(error = %err, "Client stopped receiving the response");
                    break;
                }
                if let Some(flusher) = w.flusher() {
                    if flusher.flush().await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// HTTP server running a handler chain.
pub struct HttpServer<H> {
    handler: H,
    request_timeout: Duration,
}

impl<H: Handler> HttpServer<H> {
    /// Create a server for the given handler chain.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Deadline for producing a response head. Enforced at the transport;
    /// the handlers themselves never time out.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Run the server until `shutdown` resolves.
    #[allow(deprecated)]
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(self.request_timeout))
            .service(HandlerService::new(self.handler));

        axum::serve(
            listener,
            service.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Serve `handler` on `listener` with the default request timeout until
/// `shutdown` resolves.
pub async fn serve<H, F>(listener: TcpListener, handler: H, shutdown: F) -> Result<(), io::Error>
where
    H: Handler,
    F: Future<Output = ()> + Send + 'static,
{
    HttpServer::new(handler).run(listener, shutdown).await
}
