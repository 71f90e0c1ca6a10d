//! Incoming HTTP request type.

use bytes::Bytes;
use http::header::{REFERER, USER_AGENT};
use http::{HeaderMap, Method, Uri, Version};

use crate::context::Context;

/// An incoming HTTP request with its body fully read, plus the per-request
/// [`Context`] that middleware uses to hand values down the chain.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: String,
    context: Context,
}

impl Request {
    /// Builds a request from its head, body and the peer address
    /// (`host:port`, as reported by the transport).
    pub fn new(parts: http::request::Parts, body: Bytes, remote_addr: impl Into<String>) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            remote_addr: remote_addr.into(),
            context: Context::new(),
        }
    }

    /// Convenience for tests and embedding: wraps an [`http::Request`].
    ///
    /// ```rust
    /// use reqlog::Request;
    ///
    /// let req = http::Request::get("/users/42")
    ///     .header("user-agent", "curl/8.5")
    ///     .body(bytes::Bytes::new())
    ///     .unwrap();
    /// let req = Request::from_http(req, "10.0.0.7:51234");
    ///
    /// assert_eq!(req.path(), "/users/42");
    /// assert_eq!(req.user_agent(), "curl/8.5");
    /// ```
    pub fn from_http(req: http::Request<Bytes>, remote_addr: impl Into<String>) -> Self {
        let (parts, body) = req.into_parts();
        Self::new(parts, body, remote_addr)
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Peer address exactly as the transport reported it.
    pub fn remote_addr(&self) -> &str { &self.remote_addr }

    /// Header lookup. Values that are not visible ASCII read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `Referer` header, or `""`.
    pub fn referer(&self) -> &str {
        self.headers.get(REFERER).and_then(|v| v.to_str().ok()).unwrap_or_default()
    }

    /// The `User-Agent` header, or `""`.
    pub fn user_agent(&self) -> &str {
        self.headers.get(USER_AGENT).and_then(|v| v.to_str().ok()).unwrap_or_default()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Replaces the request's context. Typically called with a child of
    /// [`context`](Request::context).
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }
}
