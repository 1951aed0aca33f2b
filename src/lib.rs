//! Composable request-handling decorators for HTTP services.
//!
//! ```text
//! RequestBodyGzipHandler            decode gzip request bodies
//!   → TransactionAwareRequestLoggingHandler
//!                                   X-Request-Id, response tracking,
//!                                   one JSON access record per request
//!     → HttpMetricsHandler          per-method latency histogram
//!       → application handler
//! ```
//!
//! Handlers write into a [`ResponseWriter`](http::ResponseWriter) sink;
//! [`HttpServer`](http::HttpServer) runs a handler chain on `axum::serve`
//! and [`ServiceHandler`](http::ServiceHandler) mounts an axum `Router` at
//! the end of the chain.

pub mod config;
pub mod handlers;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::HandlersConfig;
pub use handlers::{HttpMetricsHandler, RequestBodyGzipHandler, TransactionAwareRequestLoggingHandler};
pub use http::{Handler, HttpServer, ResponseTracker, ResponseWriter, TransactionId};
pub use lifecycle::Shutdown;
pub use observability::Logger;
