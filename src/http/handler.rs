//! Request handler abstraction.
//!
//! A [`Handler`] receives the request and a response sink and writes its
//! response into the sink. Decorators wrap another handler and are handlers
//! themselves, so they compose freely:
//!
//! ```rust,ignore
//! let chain = RequestBodyGzipHandler::new(
//!     TransactionAwareRequestLoggingHandler::new(logger, app),
//! );
//! ```

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use futures_util::future::BoxFuture;

use crate::http::writer::ResponseWriter;

/// Serves one request by writing into a [`ResponseWriter`].
pub trait Handler: Send + Sync + 'static {
    /// Handle `req`, writing the response into `w`. The returned future
    /// completes when the handler is done with the sink.
    fn serve_http<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        req: Request<Body>,
    ) -> impl Future<Output = ()> + Send + 'a;
}

impl<H: Handler> Handler for Arc<H> {
    fn serve_http<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        req: Request<Body>,
    ) -> impl Future<Output = ()> + Send + 'a {
        (**self).serve_http(w, req)
    }
}

/// Handler built from a closure, see [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

/// Build a handler from a closure returning a boxed future.
///
/// ```rust,ignore
/// let hello = handler_fn(|w, _req| Box::pin(async move {
///     let _ = w.write(b"hello").await;
/// }));
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut dyn ResponseWriter, Request<Body>) -> BoxFuture<'a, ()>
        + Send
        + Sync
        + 'static,
{
    HandlerFn { f }
}

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut dyn ResponseWriter, Request<Body>) -> BoxFuture<'a, ()>
        + Send
        + Sync
        + 'static,
{
    fn serve_http<'a>(
        &'a self,
        w: &'a mut dyn ResponseWriter,
        req: Request<Body>,
    ) -> impl Future<Output = ()> + Send + 'a {
        (self.f)(w, req)
    }
}
