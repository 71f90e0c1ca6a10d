//! # reqlog
//!
//! Request-id tagging and structured access logging for hyper-based HTTP
//! services.
//!
//! ## What it does
//!
//! - [`RequestId`](middleware::RequestId) gives every request a unique
//!   identifier (ULID by default), sends it back as `X-Request-Id` and stores
//!   it in the request [`Context`](context::Context).
//! - [`AccessLog`](middleware::AccessLog) writes one record per request with
//!   client IP, request line, status, body size, referer, user agent and
//!   duration, and hands the handler a per-request
//!   [`Logger`](middleware::Logger) already tagged with the request id.
//! - [`ObservedWriter`] wraps any [`ResponseWriter`] to learn the status and
//!   byte count without hiding flush, hijack or bulk-copy support.
//!
//! ## Handlers write, they don't return
//!
//! A [`Handler`] gets a `&mut dyn ResponseWriter` and the [`Request`]. It may
//! set headers, send a status, stream bytes and flush. Handlers that would
//! rather return a value use [`handler::from_fn`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use reqlog::middleware::{AccessLog, RequestId, logger};
//! use reqlog::{Request, Response, Server, handler};
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = RequestId::new(AccessLog::new(handler::from_fn(hello)));
//!
//!     Server::bind("0.0.0.0:3000").unwrap().serve(app).await.unwrap();
//! }
//!
//! async fn hello(req: Request) -> Response {
//!     if let Some(log) = logger::from_request(&req) {
//!         log.info("saying hello");
//!     }
//!     Response::text("Hello, World!")
//! }
//! ```

mod buffer;
pub mod context;
mod error;
pub mod handler;
pub mod middleware;
mod observe;
mod request;
mod response;
mod server;
pub mod writer;

pub use buffer::ResponseBuffer;
pub use error::Error;
pub use handler::{BoxFuture, BoxedHandler, Handler};
pub use observe::ObservedWriter;
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use server::{Server, serve_listener};
pub use writer::{Flush, Hijack, ResponseWriter, WriteFrom};
