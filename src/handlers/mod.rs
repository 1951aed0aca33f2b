//! Request-handling decorators.
//!
//! # Data Flow
//! ```text
//! request
//!     → gzip.rs (decode gzip request bodies, reject broken ones)
//!     → logging.rs (transaction ID, response tracking, access record)
//!     → metrics.rs (per-method latency histogram)
//!     → application handler
//! ```
//!
//! Each decorator wraps any [`Handler`](crate::http::Handler) and is one
//! itself, so the order above is a convention rather than a requirement.

pub mod gzip;
pub mod logging;
pub mod metrics;

pub use gzip::{request_body_gzip_handler, RequestBodyGzipHandler, GZIP_ERROR_BODY};
pub use logging::{transaction_aware_request_logging_handler, TransactionAwareRequestLoggingHandler};
pub use self::metrics::{http_metrics_handler, HttpMetricsHandler, REQUEST_DURATION_METRIC};
