//! Response tracking wrapper.
//!
//! # Responsibilities
//! - Proxy every call to the wrapped sink unchanged
//! - Observe the final status code and the number of body bytes accepted
//! - Keep exactly the optional capabilities of the wrapped sink
//!
//! # Design Decisions
//! - Capabilities are probed once, in [`ResponseTracker::new`], and never
//!   re-checked; the tracker answers its own probes from that snapshot
//! - Status is recorded on the first explicit write, on the first body
//!   write (200), or on a successful hijack (101), whichever comes first
//! - Failed calls still update the observable state; the error is returned
//!   to the caller untouched

use axum::http::{HeaderMap, StatusCode};
use futures_util::future::BoxFuture;

use crate::http::writer::{
    Capabilities, CloseNotify, Flush, Hijack, HijackedConn, ResponseWriter, SinkError,
};

/// Wraps a [`ResponseWriter`] and records status and size.
pub struct ResponseTracker<'w> {
    inner: &'w mut dyn ResponseWriter,
    status: Option<StatusCode>,
    size: usize,
    capabilities: Capabilities,
}

impl<'w> ResponseTracker<'w> {
    /// Wrap a sink, probing its optional capabilities.
    pub fn new(inner: &'w mut dyn ResponseWriter) -> Self {
        let capabilities = Capabilities::probe(inner);
        Self {
            inner,
            status: None,
            size: 0,
            capabilities,
        }
    }

    /// Recorded status, `None` while nothing has been written.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Body bytes accepted by the wrapped sink so far.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Capabilities forwarded by this tracker.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn record_status(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }
}

impl ResponseWriter for ResponseTracker<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) -> Result<(), SinkError> {
        self.record_status(status);
        self.inner.write_status(status)
    }

    fn write<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, Result<usize, SinkError>> {
        Box::pin(async move {
            self.record_status(StatusCode::OK);
            let result = self.inner.write(buf).await;
            self.size += match &result {
                Ok(n) => *n,
                Err(err) => err.bytes_written(),
            };
            result
        })
    }

    fn flusher(&mut self) -> Option<&mut dyn Flush> {
        if self.capabilities.flush {
            Some(self)
        } else {
            None
        }
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
        if self.capabilities.hijack {
            Some(self)
        } else {
            None
        }
    }

    fn close_notifier(&mut self) -> Option<&mut dyn CloseNotify> {
        if self.capabilities.close_notify {
            Some(self)
        } else {
            None
        }
    }
}

impl Flush for ResponseTracker<'_> {
    fn flush(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            match self.inner.flusher() {
                Some(flusher) => flusher.flush().await,
                None => Err(SinkError::Unsupported("flush")),
            }
        })
    }
}

impl Hijack for ResponseTracker<'_> {
    fn hijack(&mut self) -> BoxFuture<'_, Result<HijackedConn, SinkError>> {
        Box::pin(async move {
            let hijacker = self
                .inner
                .hijacker()
                .ok_or(SinkError::Unsupported("hijack"))?;
            let conn = hijacker.hijack().await?;
            self.record_status(StatusCode::SWITCHING_PROTOCOLS);
            Ok(conn)
        })
    }
}

impl CloseNotify for ResponseTracker<'_> {
    fn closed(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match self.inner.close_notifier() {
                Some(notifier) => notifier.closed().await,
                // Unreachable through our own probe; never resolve.
                None => std::future::pending().await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::recorder::ResponseRecorder;
    use axum::http::HeaderValue;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Sink with no optional capabilities.
    #[derive(Default)]
    struct PlainSink {
        headers: HeaderMap,
        body: Vec<u8>,
    }

    impl ResponseWriter for PlainSink {
        fn headers_mut(&mut self) -> &mut HeaderMap {
            &mut self.headers
        }

        fn write_status(&mut self, _status: StatusCode) -> Result<(), SinkError> {
            Ok(())
        }

        fn write<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, Result<usize, SinkError>> {
            Box::pin(async move {
                self.body.extend_from_slice(buf);
                Ok(buf.len())
            })
        }
    }

    /// Sink that accepts at most `capacity` bytes, then reports closure.
    struct ShortSink {
        headers: HeaderMap,
        capacity: usize,
        status_fails: bool,
    }

    impl ResponseWriter for ShortSink {
        fn headers_mut(&mut self) -> &mut HeaderMap {
            &mut self.headers
        }

        fn write_status(&mut self, _status: StatusCode) -> Result<(), SinkError> {
            if self.status_fails {
                Err(SinkError::HeadersSent)
            } else {
                Ok(())
            }
        }

        fn write<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, Result<usize, SinkError>> {
            Box::pin(async move {
                if buf.len() <= self.capacity {
                    self.capacity -= buf.len();
                    Ok(buf.len())
                } else {
                    let written = self.capacity;
                    self.capacity = 0;
                    Err(SinkError::Closed { written })
                }
            })
        }
    }

    /// Sink supporting hijack and close notification but not flush.
    struct UpgradeSink {
        headers: HeaderMap,
        peer: Option<tokio::io::DuplexStream>,
        fail_hijack: bool,
        closed: bool,
    }

    impl UpgradeSink {
        fn new(fail_hijack: bool) -> (Self, tokio::io::DuplexStream) {
            let (ours, theirs) = tokio::io::duplex(64);
            let sink = Self {
                headers: HeaderMap::new(),
                peer: Some(ours),
                fail_hijack,
                closed: false,
            };
            (sink, theirs)
        }
    }

    impl ResponseWriter for UpgradeSink {
        fn headers_mut(&mut self) -> &mut HeaderMap {
            &mut self.headers
        }

        fn write_status(&mut self, _status: StatusCode) -> Result<(), SinkError> {
            Ok(())
        }

        fn write<'a>(&'a mut self, buf: &'a [u8]) -> BoxFuture<'a, Result<usize, SinkError>> {
            Box::pin(async move { Ok(buf.len()) })
        }

        fn hijacker(&mut self) -> Option<&mut dyn Hijack> {
            Some(self)
        }

        fn close_notifier(&mut self) -> Option<&mut dyn CloseNotify> {
            Some(self)
        }
    }

    impl Hijack for UpgradeSink {
        fn hijack(&mut self) -> BoxFuture<'_, Result<HijackedConn, SinkError>> {
            Box::pin(async move {
                if self.fail_hijack {
                    return Err(SinkError::Unsupported("hijack"));
                }
                let conn = self.peer.take().ok_or(SinkError::HeadersSent)?;
                Ok(Box::new(conn) as HijackedConn)
            })
        }
    }

    impl CloseNotify for UpgradeSink {
        fn closed(&mut self) -> BoxFuture<'_, ()> {
            Box::pin(async move {
                self.closed = true;
            })
        }
    }

    #[tokio::test]
    async fn test_accessors_before_any_write() {
        let mut sink = PlainSink::default();
        let tracker = ResponseTracker::new(&mut sink);
        assert_eq!(tracker.status(), None);
        assert_eq!(tracker.size(), 0);
    }

    #[tokio::test]
    async fn test_write_implies_ok_and_sums_sizes() {
        let mut sink = PlainSink::default();
        let mut tracker = ResponseTracker::new(&mut sink);

        for chunk in [&b"hello"[..], b" ", b"world", b""] {
            tracker.write(chunk).await.unwrap();
        }

        assert_eq!(tracker.status(), Some(StatusCode::OK));
        assert_eq!(tracker.size(), 11);
        assert_eq!(sink.body, b"hello world");
    }

    #[tokio::test]
    async fn test_first_explicit_status_is_kept() {
        let mut rec = ResponseRecorder::new();
        let mut tracker = ResponseTracker::new(&mut rec);

        tracker.write_status(StatusCode::ACCEPTED).unwrap();
        tracker.write_status(StatusCode::INTERNAL_SERVER_ERROR).unwrap();
        tracker.write(b"abc").await.unwrap();

        assert_eq!(tracker.status(), Some(StatusCode::ACCEPTED));
        assert_eq!(tracker.size(), 3);
    }

    #[tokio::test]
    async fn test_status_after_write_is_not_recorded() {
        let mut rec = ResponseRecorder::new();
        let mut tracker = ResponseTracker::new(&mut rec);

        tracker.write(b"abc").await.unwrap();
        tracker.write_status(StatusCode::NOT_FOUND).unwrap();

        assert_eq!(tracker.status(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_headers_are_forwarded() {
        let mut rec = ResponseRecorder::new();
        {
            let mut tracker = ResponseTracker::new(&mut rec);
            tracker
                .headers_mut()
                .insert("x-test", HeaderValue::from_static("1"));
        }
        assert_eq!(rec.headers["x-test"], "1");
    }

    #[tokio::test]
    async fn test_partial_write_counts_and_error_propagates() {
        let mut sink = ShortSink {
            headers: HeaderMap::new(),
            capacity: 7,
            status_fails: false,
        };
        let mut tracker = ResponseTracker::new(&mut sink);

        assert_eq!(tracker.write(b"12345").await.unwrap(), 5);
        let err = tracker.write(b"67890").await.unwrap_err();

        assert!(matches!(err, SinkError::Closed { written: 2 }));
        assert_eq!(tracker.size(), 7);
    }

    #[tokio::test]
    async fn test_failed_status_write_is_still_recorded() {
        let mut sink = ShortSink {
            headers: HeaderMap::new(),
            capacity: 0,
            status_fails: true,
        };
        let mut tracker = ResponseTracker::new(&mut sink);

        let err = tracker.write_status(StatusCode::BAD_GATEWAY).unwrap_err();
        assert!(matches!(err, SinkError::HeadersSent));
        assert_eq!(tracker.status(), Some(StatusCode::BAD_GATEWAY));
    }

    #[tokio::test]
    async fn test_missing_capabilities_are_not_claimed() {
        let mut sink = PlainSink::default();
        let mut tracker = ResponseTracker::new(&mut sink);

        assert_eq!(tracker.capabilities(), Capabilities::default());
        assert!(tracker.flusher().is_none());
        assert!(tracker.hijacker().is_none());
        assert!(tracker.close_notifier().is_none());
    }

    #[tokio::test]
    async fn test_flush_is_forwarded() {
        let mut rec = ResponseRecorder::new();
        {
            let mut tracker = ResponseTracker::new(&mut rec);
            let flusher = tracker.flusher().expect("recorder supports flush");
            flusher.flush().await.unwrap();
            assert!(tracker.hijacker().is_none());
        }
        assert!(rec.flushed);
    }

    #[tokio::test]
    async fn test_hijack_records_switching_protocols() {
        let (mut sink, mut client) = UpgradeSink::new(false);
        let mut tracker = ResponseTracker::new(&mut sink);

        assert!(tracker.flusher().is_none());
        let mut conn = tracker.hijacker().unwrap().hijack().await.unwrap();
        assert_eq!(tracker.status(), Some(StatusCode::SWITCHING_PROTOCOLS));

        conn.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_hijack_keeps_explicit_status() {
        let (mut sink, _client) = UpgradeSink::new(false);
        let mut tracker = ResponseTracker::new(&mut sink);

        tracker.write_status(StatusCode::FORBIDDEN).unwrap();
        tracker.hijacker().unwrap().hijack().await.unwrap();
        assert_eq!(tracker.status(), Some(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_failed_hijack_leaves_status_unset() {
        let (mut sink, _client) = UpgradeSink::new(true);
        let mut tracker = ResponseTracker::new(&mut sink);

        let result = tracker.hijacker().unwrap().hijack().await;
        assert!(matches!(result, Err(SinkError::Unsupported("hijack"))));
        assert_eq!(tracker.status(), None);
    }

    #[tokio::test]
    async fn test_close_notify_is_forwarded() {
        let (mut sink, _client) = UpgradeSink::new(false);
        {
            let mut tracker = ResponseTracker::new(&mut sink);
            tracker.close_notifier().unwrap().closed().await;
        }
        assert!(sink.closed);
    }

    #[tokio::test]
    async fn test_nested_trackers_agree() {
        let mut rec = ResponseRecorder::new();
        let mut outer = ResponseTracker::new(&mut rec);
        let outer_caps = outer.capabilities();
        {
            let mut inner = ResponseTracker::new(&mut outer);
            assert_eq!(inner.capabilities(), outer_caps);
            inner.write(b"0123456789").await.unwrap();
            assert_eq!(inner.size(), 10);
        }
        assert_eq!(outer.size(), 10);
        assert_eq!(outer.status(), Some(StatusCode::OK));
    }
}
