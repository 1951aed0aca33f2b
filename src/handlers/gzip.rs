//! Transparent gunzipping of request bodies.
//!
//! # Responsibilities
//! - Decompress bodies sent with `Content-Encoding: gzip` before they reach
//!   the downstream handler
//! - Reject bodies that claim gzip but do not decode
//!
//! # Design Decisions
//! - Decoding is streamed; the first decoded chunk is read up front so an
//!   invalid body is rejected before the downstream handler runs
//! - `Content-Encoding` and the stale `Content-Length` are removed, so
//!   applying the handler twice is harmless
//! - Concatenated gzip members are decoded as one stream

use std::future::Future;
use std::io;

use async_compression::tokio::bufread::GzipDecoder;
use axum::body::Body;
use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::{HeaderValue, Request, StatusCode};
use futures_util::{StreamExt, TryStreamExt};
use tokio_util::io::{ReaderStream, StreamReader};

use crate::http::handler::Handler;
use crate::http::writer::ResponseWriter;

/// Body of the 400 response for undecodable requests.
pub const GZIP_ERROR_BODY: &str = "failed to read gzipped request\n";

/// Decompresses gzip request bodies for the wrapped handler.
#[derive(Debug, Clone)]
pub struct RequestBodyGzipHandler<H> {
    next: H,
}

impl<H: Handler> RequestBodyGzipHandler<H> {
    pub fn new(next: H) -> Self {
        Self { next }
    }
}

/// Shorthand for [`RequestBodyGzipHandler::new`].
pub fn request_body_gzip_handler<H: Handler>(next: H) -> RequestBodyGzipHandler<H> {
    RequestBodyGzipHandler::new(next)
}

fn is_gzip<B>(req: &Request<B>) -> bool {
    req.headers()
        .get(CONTENT_ENCODING)
        .is_some_and(|v| v.as_bytes() == b"gzip")
}

impl<H: Handler> Handler for RequestBodyGzipHandler<H> {
    fn serve_http<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        req: Request<Body>,
    ) -> impl Future<Output = ()> + Send + 'a {
        async move {
            if !is_gzip(&req) {
                self.next.serve_http(w, req).await;
                return;
            }

            let (mut parts, body) = req.into_parts();
            let compressed = StreamReader::new(body.into_data_stream().map_err(io::Error::other));
            let mut decoder = GzipDecoder::new(compressed);
            decoder.multiple_members(true);
            let mut decoded = ReaderStream::new(decoder);

            let first = match decoded.next().await {
                Some(Err(err)) => {
                    reject(w, err).await;
                    return;
                }
                first => first,
            };

            parts.headers.remove(CONTENT_ENCODING);
            parts.headers.remove(CONTENT_LENGTH);
            let stream = futures_util::stream::iter(first).chain(decoded);
            let req = Request::from_parts(parts, Body::from_stream(stream));

            self.next.serve_http(w, req).await;
        }
    }
}

async fn reject(w: &mut dyn ResponseWriter, err: io::Error) {
    tracing::debug!(error = %err, "Rejecting undecodable gzip request body");

    let headers = w.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.remove(CONTENT_LENGTH);

    if let Err(err) = w.write_status(StatusCode::BAD_REQUEST) {
        tracing::debug!(error = %err, "Could not set response status");
    }
    if let Err(err) = w.write(GZIP_ERROR_BODY.as_bytes()).await {
        tracing::debug!(error = %err, "Could not write response body");
    }
}
