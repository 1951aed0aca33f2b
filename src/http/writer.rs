//! Response sink abstraction.
//!
//! # Responsibilities
//! - Define the minimal capability set every response sink provides
//!   (headers, status, body writes)
//! - Define the optional capabilities a sink may additionally offer
//!   (streaming flush, connection takeover, close notification)
//! - Let callers probe for optional capabilities at runtime
//!
//! # Design Decisions
//! - Object safe: handlers receive `&mut dyn ResponseWriter`
//! - Optional capabilities are separate traits reached through probe methods
//!   that default to `None`, so a sink never claims what it lacks
//! - Writes report partial byte counts through [`SinkError::bytes_written`]

use axum::http::{HeaderMap, StatusCode};
use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

/// Errors produced by a response sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The receiving side went away. `written` bytes of the failed call
    /// were still accepted.
    #[error("response sink closed after accepting {written} bytes")]
    Closed { written: usize },

    /// The response head has already been handed to the transport.
    #[error("response headers already sent")]
    HeadersSent,

    /// The sink does not provide the requested capability.
    #[error("response sink does not support {0}")]
    Unsupported(&'static str),

    /// The connection upgrade negotiated by the transport failed.
    #[error("connection upgrade failed: {0}")]
    Upgrade(#[from] hyper::Error),
}

impl SinkError {
    /// Number of bytes the sink accepted before failing.
    pub fn bytes_written(&self) -> usize {
        match self {
            SinkError::Closed { written } => *written,
            _ => 0,
        }
    }
}

/// A raw bidirectional connection taken over from the HTTP server.
pub trait HijackedIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> HijackedIo for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Boxed connection returned by [`Hijack::hijack`].
pub type HijackedConn = Box<dyn HijackedIo>;

/// Outbound response sink handed to a [`Handler`](crate::http::Handler).
pub trait ResponseWriter: Send {
    /// Response headers. Changes made after the head has been sent are
    /// not transmitted.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Set the response status code.
    fn write_status(&mut self, status: StatusCode) -> Result<(), SinkError>;

    /// Write body bytes, returning how many were accepted.
    fn write<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, Result<usize, SinkError>>;

    /// Streaming flush capability, if supported.
    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        None
    }

    /// Connection takeover capability, if supported.
    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        None
    }

    /// Client disconnect notification capability, if supported.
    fn close_notifier(&mut self) -> Option<&mut dyn CloseNotify> {
        None
    }
}

/// Push buffered body bytes to the client.
pub trait Flush: Send {
    fn flush(&mut self) -> BoxFuture<'_, Result<(), SinkError>>;
}

/// Take over the underlying connection (protocol upgrade).
pub trait Hijack: Send {
    fn hijack(&mut self) -> BoxFuture<'_, Result<HijackedConn, SinkError>>;
}

/// Observe the client going away.
pub trait CloseNotify: Send {
    /// Resolves once the client is no longer receiving the response.
    fn closed(&mut self) -> BoxFuture<'_, ()>;
}

/// The optional capabilities a sink exposed when it was probed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub flush: bool,
    pub hijack: bool,
    pub close_notify: bool,
}

impl Capabilities {
    /// Probe a sink for each optional capability.
    pub fn probe(writer: &mut dyn ResponseWriter) -> Self {
        Self {
            flush: writer.flusher().is_some(),
            hijack: writer.hijacker().is_some(),
            close_notify: writer.close_notifier().is_some(),
        }
    }
}
