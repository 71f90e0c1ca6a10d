//! Access logging plus a per-request error logger.
//!
//! [`AccessLog`] wraps a handler and, for every request:
//!
//! 1. binds a [`Logger`] (error sink + request id) into the request context;
//! 2. runs the handler behind an [`ObservedWriter`];
//! 3. writes one access record to the access sink once the handler is done.
//!
//! Step 3 also happens if the handler panics or the request is cancelled, in
//! which case the record shows whatever status and size were reached.
//!
//! Access record fields:
//!
//! | field | value |
//! |---|---|
//! | `request_id` | from [`RequestId`](super::RequestId), omitted without it |
//! | `remote_ip` | peer address without the port |
//! | `request` | `"GET /path?query HTTP/1.1"` |
//! | `response` | status code, `0` if nothing was sent |
//! | `bytes` | body bytes written |
//! | `referer` | `Referer` header or `""` |
//! | `agent` | `User-Agent` header or `""` |
//! | `duration` | handler wall time in nanoseconds |

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{Level, Span, info};

use super::request_id;
use super::sink::{Format, Sink};
use crate::context::{Context, Key};
use crate::handler::{BoxFuture, Handler};
use crate::observe::ObservedWriter;
use crate::request::Request;
use crate::writer::ResponseWriter;

struct LoggerKey;

impl Key for LoggerKey {
    type Value = Logger;
}

/// The [`Logger`] [`AccessLog`] stored in `ctx`, if any.
pub fn from_context(ctx: &Context) -> Option<&Logger> {
    ctx.value::<LoggerKey>()
}

/// The [`Logger`] [`AccessLog`] stored in `req`'s context, if any.
pub fn from_request(req: &Request) -> Option<&Logger> {
    from_context(req.context())
}

// ── Logger ───────────────────────────────────────────────────────────────────

/// Per-request application logger writing to the error sink.
///
/// Every record carries the request id when one was assigned.
///
/// ```rust
/// use http::StatusCode;
/// use reqlog::{Request, Response};
/// use reqlog::middleware::logger;
///
/// async fn checkout(req: Request) -> Response {
///     if let Some(log) = logger::from_request(&req) {
///         log.error("payment provider unreachable");
///     }
///     Response::status(StatusCode::BAD_GATEWAY)
/// }
/// ```
#[derive(Clone)]
pub struct Logger {
    sink: Sink,
    request_id: Option<Arc<str>>,
}

impl Logger {
    pub fn new(sink: Sink, request_id: Option<&str>) -> Self {
        Self { sink, request_id: request_id.map(Arc::from) }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.log(Level::ERROR, message)
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.log(Level::WARN, message)
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(Level::INFO, message)
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Level::DEBUG, message)
    }

    pub fn trace(&self, message: impl fmt::Display) {
        self.log(Level::TRACE, message)
    }

    pub fn log(&self, level: Level, message: impl fmt::Display) {
        let id = self.request_id();
        self.sink.in_scope(|| {
            // Event levels must be constants, hence one macro per level.
            if level == Level::ERROR {
                tracing::error!(request_id = id, "{message}");
            } else if level == Level::WARN {
                tracing::warn!(request_id = id, "{message}");
            } else if level == Level::INFO {
                tracing::info!(request_id = id, "{message}");
            } else if level == Level::DEBUG {
                tracing::debug!(request_id = id, "{message}");
            } else {
                tracing::trace!(request_id = id, "{message}");
            }
        })
    }

    /// Runs `f` with the error sink as default subscriber, inside a span
    /// carrying the request id, so plain `tracing` macros can be used.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        let id = self.request_id();
        self.sink.in_scope(|| {
            let span: Span = tracing::error_span!("request", request_id = id);
            span.in_scope(f)
        })
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("request_id", &self.request_id).finish_non_exhaustive()
    }
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Sinks used by [`AccessLog`].
#[derive(Clone, Debug)]
pub struct LoggerConfig {
    /// Receives one record per request.
    pub access: Sink,
    /// Backs the per-request [`Logger`].
    pub error: Sink,
}

impl LoggerConfig {
    pub fn new(access: Sink, error: Sink) -> Self {
        Self { access, error }
    }

    /// JSON records: access on stdout, errors (`ERROR` and up) on stderr.
    pub fn json() -> Self {
        Self {
            access: Sink::builder().format(Format::Json).strip_level(true).build(std::io::stdout),
            error: Sink::builder()
                .format(Format::Json)
                .level(tracing::level_filters::LevelFilter::ERROR)
                .build(std::io::stderr),
        }
    }
}

/// Text records: access on stdout, errors (`ERROR` and up) on stderr.
impl Default for LoggerConfig {
    fn default() -> Self {
        Self { access: Sink::stdout(), error: Sink::stderr() }
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Middleware writing one access record per request.
///
/// Place it inside [`RequestId`](super::RequestId) so the record and the
/// per-request [`Logger`] carry the identifier:
///
/// ```rust
/// use reqlog::middleware::{AccessLog, RequestId};
/// use reqlog::{Request, handler};
///
/// async fn hello(_req: Request) -> &'static str {
///     "Hello, World!"
/// }
///
/// let app = RequestId::new(AccessLog::new(handler::from_fn(hello)));
/// # let _ = app;
/// ```
pub struct AccessLog<H> {
    next: H,
    config: LoggerConfig,
}

impl<H: Handler> AccessLog<H> {
    /// Text records, see [`LoggerConfig::default`].
    pub fn new(next: H) -> Self {
        Self::with_config(next, LoggerConfig::default())
    }

    /// JSON records, see [`LoggerConfig::json`].
    pub fn json(next: H) -> Self {
        Self::with_config(next, LoggerConfig::json())
    }

    pub fn with_config(next: H, config: LoggerConfig) -> Self {
        Self { next, config }
    }
}

impl<H: Handler> Handler for AccessLog<H> {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: Request) -> BoxFuture<'a> {
        Box::pin(async move {
            let id = request_id::from_request(&req);
            let logger = Logger::new(self.config.error.clone(), id);
            let mut record = AccessRecord::start(&self.config.access, &req, id, w);

            let ctx = req.context().with_value::<LoggerKey>(logger);
            self.next.serve(&mut record.writer, req.with_context(ctx)).await;
            // `record` is emitted when dropped, here or during unwinding.
        })
    }
}

/// Everything the access record needs, captured before the request moves on.
struct AccessRecord<'a> {
    sink: &'a Sink,
    request_id: Option<String>,
    remote_ip: String,
    request: String,
    referer: String,
    agent: String,
    started: Instant,
    writer: ObservedWriter<&'a mut dyn ResponseWriter>,
}

impl<'a> AccessRecord<'a> {
    fn start(
        sink: &'a Sink,
        req: &Request,
        request_id: Option<&str>,
        w: &'a mut dyn ResponseWriter,
    ) -> Self {
        Self {
            sink,
            request_id: request_id.map(str::to_owned),
            remote_ip: strip_port(req.remote_addr()).to_owned(),
            request: format!("{} {} {:?}", req.method(), request_target(req), req.version()),
            referer: req.referer().to_owned(),
            agent: req.user_agent().to_owned(),
            started: Instant::now(),
            writer: ObservedWriter::new(w),
        }
    }
}

impl Drop for AccessRecord<'_> {
    fn drop(&mut self) {
        let duration = u64::try_from(self.started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        let status = self.writer.status().map_or(0, |s| s.as_u16());

        self.sink.in_scope(|| {
            info!(
                target: "access_log",
                request_id = self.request_id.as_deref(),
                remote_ip = %self.remote_ip,
                request = %self.request,
                response = status,
                bytes = self.writer.size(),
                referer = %self.referer,
                agent = %self.agent,
                duration
            );
        });
    }
}

/// Origin-form target (`/path?query`), whatever form the URI arrived in.
fn request_target(req: &Request) -> &str {
    match req.uri().path_and_query() {
        Some(pq) => pq.as_str(),
        None => req.uri().authority().map_or("", |a| a.as_str()),
    }
}

/// `host:port` → `host`, `[v6]:port` → `v6`; anything else is returned as is.
fn strip_port(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        return match rest.split_once("]:") {
            Some((host, port)) if !port.contains(':') => host,
            _ => addr,
        };
    }
    match addr.rsplit_once(':') {
        // More than one colon outside brackets: not a `host:port` pair.
        Some((host, _)) if !host.contains(':') => host,
        _ => addr,
    }
}
