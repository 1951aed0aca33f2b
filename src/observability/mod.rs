//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request handlers produce:
//!     → logger.rs (one JSON access record per request)
//!     → identifiers.rs (content UUIDs found in the request target)
//!     → metrics.rs (latency histograms via the global recorder)
//!
//! Crate internals produce:
//!     → logging.rs (tracing diagnostics)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Transaction ID is on every access record
//! - Access records and diagnostics are separate streams

pub mod identifiers;
pub mod logger;
pub mod logging;
pub mod metrics;

pub use identifiers::uuids_in;
pub use logger::{Entry, Logger};
pub use logging::init_tracing;
pub use self::metrics::{install_prometheus, GlobalRecorder};
