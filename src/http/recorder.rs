//! In-memory response sink.
//!
//! Records everything a handler writes so it can be inspected afterwards.
//! Supports streaming flush; does not support hijack or close notification.

use axum::http::{HeaderMap, StatusCode};
use bytes::BytesMut;
use futures_util::future::BoxFuture;

use crate::http::writer::{Flush, ResponseWriter, SinkError};

/// A [`ResponseWriter`] that keeps the response in memory.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    /// First status written, or 200 once the body was written or flushed.
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: BytesMut,
    /// Whether the handler flushed at least once.
    pub flushed: bool,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status the client would observe (200 when nothing was set).
    pub fn status_code(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Body as lossy UTF-8.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) -> Result<(), SinkError> {
        if self.status.is_none() {
            self.status = Some(status);
        }
        Ok(())
    }

    fn write<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, Result<usize, SinkError>> {
        Box::pin(async move {
            self.status.get_or_insert(StatusCode::OK);
            self.body.extend_from_slice(buf);
            Ok(buf.len())
        })
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        Some(self)
    }
}

impl Flush for ResponseRecorder {
    fn flush(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            self.status.get_or_insert(StatusCode::OK);
            self.flushed = true;
            Ok(())
        })
    }
}
