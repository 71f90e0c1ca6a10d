//! Request instrumentation middleware.
//!
//! - [`RequestId`] tags every request with a unique identifier, exposed in
//!   the `X-Request-Id` response header and in the request context.
//! - [`AccessLog`] writes one structured access record per request and gives
//!   downstream handlers a per-request [`Logger`].
//!
//! Compose them outside-in, identifier first:
//!
//! ```text
//! request → RequestId → AccessLog → your handler
//!                           │
//!                           └── access record, after the handler returns
//! ```

pub mod logger;
pub mod request_id;
mod sink;

pub use logger::{AccessLog, Logger, LoggerConfig};
pub use request_id::{RequestId, X_REQUEST_ID};
pub use sink::{Format, Sink, SinkBuilder};
