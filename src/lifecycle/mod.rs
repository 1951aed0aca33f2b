//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → resolve the shutdown future
//!
//! Shutdown (shutdown.rs):
//!     trigger() → every subscribed server stops accepting → in-flight
//!     requests drain → run() returns
//! ```
//!
//! # Design Decisions
//! - Shutdown is a future handed to `HttpServer::run`, so signals and
//!   programmatic triggers compose the same way

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
