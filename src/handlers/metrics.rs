//! Per-method request latency.
//!
//! Records the duration of every request in the histogram
//! `http_request_duration_seconds`, labelled with the request method. The
//! histogram's sample count doubles as the per-method request count.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use metrics::{Key, Label, Metadata, Recorder};

use crate::http::handler::Handler;
use crate::http::writer::ResponseWriter;
use crate::observability::metrics::GlobalRecorder;

/// Name of the latency histogram.
pub const REQUEST_DURATION_METRIC: &str = "http_request_duration_seconds";

/// Times every request passing through it.
pub struct HttpMetricsHandler<H, R = GlobalRecorder> {
    recorder: Arc<R>,
    next: H,
}

impl<H, R> HttpMetricsHandler<H, R>
where
    H: Handler,
    R: Recorder + Send + Sync + 'static,
{
    pub fn new(recorder: R, next: H) -> Self {
        Self {
            recorder: Arc::new(recorder),
            next,
        }
    }

    /// Share a recorder between several handlers.
    pub fn with_shared_recorder(recorder: Arc<R>, next: H) -> Self {
        Self { recorder, next }
    }
}

/// Shorthand for [`HttpMetricsHandler::new`].
pub fn http_metrics_handler<H, R>(recorder: R, next: H) -> HttpMetricsHandler<H, R>
where
    H: Handler,
    R: Recorder + Send + Sync + 'static,
{
    HttpMetricsHandler::new(recorder, next)
}

impl<H, R> Handler for HttpMetricsHandler<H, R>
where
    H: Handler,
    R: Recorder + Send + Sync + 'static,
{
    fn serve_http<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        req: Request<Body>,
    ) -> impl Future<Output = ()> + Send + 'a {
        async move {
            let key = Key::from_parts(
                REQUEST_DURATION_METRIC,
                vec![Label::new("method", req.method().as_str().to_string())],
            );
            let metadata = Metadata::new(module_path!(), metrics::Level::INFO, Some(module_path!()));
            let histogram = self.recorder.register_histogram(&key, &metadata);

            let start = Instant::now();
            self.next.serve_http(w, req).await;
            histogram.record(start.elapsed().as_secs_f64());
        }
    }
}
