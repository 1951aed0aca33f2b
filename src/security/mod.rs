//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request headers
//!     → headers.rs (deny-list, predicate, canonical names)
//!     → access log record
//! ```
//!
//! # Design Decisions
//! - Credentials and tracking headers never reach the logs
//! - Redaction policy is fixed when the handler is built

pub mod headers;

pub use headers::{canonical_header_key, DenyList, HeaderPredicate, RedactionPolicy};
