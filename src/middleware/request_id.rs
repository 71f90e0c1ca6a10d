//! Per-request identifier tagging.
//!
//! [`RequestId`] stamps every request with a fresh token before the wrapped
//! handler runs. The token is visible in two places:
//!
//! - the `X-Request-Id` response header, for the client;
//! - the request [`Context`], for everything downstream
//!   ([`from_request`] / [`from_context`]), including [`AccessLog`].
//!
//! [`AccessLog`]: crate::middleware::AccessLog

use http::{HeaderName, HeaderValue};
use tracing::warn;

use crate::context::{Context, Key};
use crate::handler::{BoxFuture, Handler};
use crate::request::Request;
use crate::writer::ResponseWriter;

/// Response header carrying the generated identifier.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

struct RequestIdKey;

impl Key for RequestIdKey {
    type Value = String;
}

/// A 26-character ULID: unique and lexicographically sortable by creation time.
pub fn ulid() -> String {
    ulid::Ulid::new().to_string()
}

/// A 36-character random (v4) UUID in canonical hyphenated form.
pub fn uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The identifier [`RequestId`] stored in `ctx`, if any.
pub fn from_context(ctx: &Context) -> Option<&str> {
    ctx.value::<RequestIdKey>().map(String::as_str)
}

/// The identifier [`RequestId`] stored in `req`'s context, if any.
pub fn from_request(req: &Request) -> Option<&str> {
    from_context(req.context())
}

/// Middleware that tags each request with a generated identifier.
///
/// The generator is any `Fn() -> String`; [`ulid`] is the default and
/// [`uuid`] the usual alternative. Generators are expected not to fail.
///
/// ```rust
/// use reqlog::middleware::{RequestId, request_id};
/// use reqlog::{Request, Response, handler};
///
/// async fn show(req: Request) -> Response {
///     let id = request_id::from_request(&req).unwrap_or("-");
///     Response::text(id.to_owned())
/// }
///
/// let sortable = RequestId::new(handler::from_fn(show));
/// let canonical = RequestId::with_generator(handler::from_fn(show), request_id::uuid);
/// # let _ = (sortable, canonical);
/// ```
pub struct RequestId<H> {
    next: H,
    generate: Box<dyn Fn() -> String + Send + Sync>,
}

impl<H: Handler> RequestId<H> {
    /// Tags requests with [`ulid`]s.
    pub fn new(next: H) -> Self {
        Self::with_generator(next, ulid)
    }

    pub fn with_generator<G>(next: H, generate: G) -> Self
    where
        G: Fn() -> String + Send + Sync + 'static,
    {
        Self { next, generate: Box::new(generate) }
    }
}

impl<H: Handler> Handler for RequestId<H> {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: Request) -> BoxFuture<'a> {
        let id = (self.generate)();

        match HeaderValue::from_str(&id) {
            Ok(value) => {
                w.headers_mut().append(X_REQUEST_ID, value);
            }
            Err(_) => warn!(request_id = %id, "request id is not a valid header value, header skipped"),
        }

        let ctx = req.context().with_value::<RequestIdKey>(id);
        self.next.serve(w, req.with_context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;

    use super::*;
    use crate::{ResponseBuffer, handler};

    fn request() -> Request {
        Request::from_http(http::Request::get("/").body(Bytes::new()).unwrap(), "127.0.0.1:1")
    }

    // Records the id seen by the handler.
    fn spy(seen: Arc<Mutex<Option<String>>>) -> impl Handler {
        handler::from_writer_fn(move |w, req| {
            *seen.lock().unwrap() = from_request(&req).map(str::to_owned);
            Box::pin(async move {
                w.write(b"ok").unwrap();
            })
        })
    }

    async fn run(mw: &impl Handler) -> ResponseBuffer {
        let mut w = ResponseBuffer::new();
        mw.serve(&mut w, request()).await;
        w
    }

    #[tokio::test]
    async fn ulid_by_default() {
        let seen = Arc::new(Mutex::new(None));
        let w = run(&RequestId::new(spy(seen.clone()))).await;

        let id = seen.lock().unwrap().clone().expect("id in context");
        assert_eq!(id.len(), 26);
        assert_eq!(w.headers().get(X_REQUEST_ID).unwrap(), id.as_str());
    }

    #[tokio::test]
    async fn uuid_generator() {
        let seen = Arc::new(Mutex::new(None));
        let w = run(&RequestId::with_generator(spy(seen.clone()), uuid)).await;

        let id = seen.lock().unwrap().clone().expect("id in context");
        assert_eq!(id.len(), 36);
        assert_eq!(w.headers().get(X_REQUEST_ID).unwrap(), id.as_str());
    }

    #[tokio::test]
    async fn custom_generator_is_called_per_request() {
        let counter = Arc::new(Mutex::new(0u32));
        let c = counter.clone();
        let mw = RequestId::with_generator(spy(Arc::new(Mutex::new(None))), move || {
            let mut n = c.lock().unwrap();
            *n += 1;
            format!("req-{n}")
        });

        let first = run(&mw).await;
        let second = run(&mw).await;
        assert_eq!(first.headers().get(X_REQUEST_ID).unwrap(), "req-1");
        assert_eq!(second.headers().get(X_REQUEST_ID).unwrap(), "req-2");
    }

    #[tokio::test]
    async fn invalid_header_value_still_reaches_context() {
        let seen = Arc::new(Mutex::new(None));
        let w = run(&RequestId::with_generator(spy(seen.clone()), || "bad\nid".to_owned())).await;

        assert!(w.headers().get(X_REQUEST_ID).is_none());
        assert_eq!(seen.lock().unwrap().as_deref(), Some("bad\nid"));
    }

    #[test]
    fn absent_without_middleware() {
        assert!(from_request(&request()).is_none());
        assert!(from_context(&Context::new()).is_none());
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(ulid(), ulid());
        assert_ne!(uuid(), uuid());
    }
}
