//! HTTP plumbing shared by the handlers.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum::serve, HandlerService, streaming sink)
//!     → handler.rs (Handler chain: gzip → logging → metrics → app)
//!     → tracker.rs (status/size capture around the sink)
//!     → writer.rs (sink contract and optional capabilities)
//! ```

pub mod client;
pub mod handler;
pub mod recorder;
pub mod request;
pub mod server;
pub mod tracker;
pub mod writer;

pub use client::{ClientError, ServiceClient, ServiceClientLayer};
pub use handler::{handler_fn, Handler, HandlerFn};
pub use recorder::ResponseRecorder;
pub use request::{
    RandomTransactionIds, RemoteAddr, TransactionId, TransactionIdGenerator,
    TRANSACTION_ID_HEADER,
};
pub use server::{serve, HandlerService, HttpServer, ServiceHandler};
pub use tracker::ResponseTracker;
pub use writer::{
    Capabilities, CloseNotify, Flush, Hijack, HijackedConn, HijackedIo, ResponseWriter, SinkError,
};
