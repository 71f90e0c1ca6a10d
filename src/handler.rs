//! The [`Handler`] trait and adapters for plain async functions.
//!
//! # Shape of a handler
//!
//! A handler receives the response writer *by reference* and the request by
//! value, and returns a boxed future borrowing the writer:
//!
//! ```text
//! serve(&'a self, w: &'a mut dyn ResponseWriter, req: Request) -> BoxFuture<'a>
//! ```
//!
//! Borrowing the writer is what lets middleware slip a wrapper in front of it
//! (an [`ObservedWriter`](crate::ObservedWriter), say) for exactly the
//! duration of the call, and inspect it afterwards.
//!
//! Most application code never implements the trait by hand:
//!
//! ```text
//! async fn hello(req: Request) -> impl IntoResponse   ← handler::from_fn
//! |w, req| Box::pin(async move { … })                  ← handler::from_writer_fn
//! ```
//!
//! The per-request cost of dispatch is one boxed future and one virtual call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::request::Request;
use crate::response::IntoResponse;
use crate::writer::ResponseWriter;

/// A heap-allocated, type-erased future borrowing the response writer for `'a`.
///
/// `Send` so the runtime may move a request between worker threads while it
/// is suspended.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Something that can answer requests.
///
/// Implemented by the middleware in this crate, by the adapters below, and by
/// `Arc<H>` so one handler can be shared between servers.
pub trait Handler: Send + Sync + 'static {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: Request) -> BoxFuture<'a>;
}

/// A type-erased, shareable handler.
pub type BoxedHandler = Arc<dyn Handler>;

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: Request) -> BoxFuture<'a> {
        (**self).serve(w, req)
    }
}

// ── Value-style functions ─────────────────────────────────────────────────────

/// Adapts `async fn(Request) -> impl IntoResponse` into a [`Handler`].
///
/// ```rust
/// use reqlog::{Request, Response, handler};
///
/// async fn hello(_req: Request) -> Response {
///     Response::text("Hello, World!")
/// }
///
/// let app = handler::from_fn(hello);
/// # let _ = app;
/// ```
pub fn from_fn<F, Fut, R>(f: F) -> FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    FnHandler(f)
}

/// Handler returned by [`from_fn`].
#[derive(Clone, Copy, Debug)]
pub struct FnHandler<F>(F);

impl<F, Fut, R> Handler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: Request) -> BoxFuture<'a> {
        let fut = (self.0)(req);
        Box::pin(async move {
            if let Err(e) = fut.await.into_response().write_to(w) {
                // The client is gone; nothing left to tell it.
                debug!("response write failed: {e}");
            }
        })
    }
}

// ── Writer-style functions ────────────────────────────────────────────────────

/// Adapts a closure that drives the [`ResponseWriter`] itself, for handlers
/// that stream, flush or hijack.
///
/// ```rust
/// use reqlog::{ResponseWriter, handler};
///
/// let app = handler::from_writer_fn(|w, _req| {
///     Box::pin(async move {
///         let _ = w.write(b"chunk one\n");
///         if let Some(f) = w.as_flush() {
///             let _ = f.flush();
///         }
///         let _ = w.write(b"chunk two\n");
///     })
/// });
/// # let _ = app;
/// ```
pub fn from_writer_fn<F>(f: F) -> WriterFnHandler<F>
where
    F: for<'a> Fn(&'a mut dyn ResponseWriter, Request) -> BoxFuture<'a> + Send + Sync + 'static,
{
    WriterFnHandler(f)
}

/// Handler returned by [`from_writer_fn`].
#[derive(Clone, Copy, Debug)]
pub struct WriterFnHandler<F>(F);

impl<F> Handler for WriterFnHandler<F>
where
    F: for<'a> Fn(&'a mut dyn ResponseWriter, Request) -> BoxFuture<'a> + Send + Sync + 'static,
{
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: Request) -> BoxFuture<'a> {
        (self.0)(w, req)
    }
}
