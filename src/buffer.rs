//! In-memory response writer.

use std::io::{self, Read};

use http::{HeaderMap, StatusCode};

use crate::writer::{Flush, ResponseWriter, WriteFrom};

/// A [`ResponseWriter`] that keeps everything in memory.
///
/// Useful for unit-testing handlers and middleware without a socket, and for
/// rendering a handler's output into bytes. Supports [`Flush`] and
/// [`WriteFrom`]; it has no connection to hijack.
///
/// ```rust
/// use http::StatusCode;
/// use reqlog::{ResponseBuffer, ResponseWriter};
///
/// let mut w = ResponseBuffer::new();
/// w.write(b"Hello").unwrap();
///
/// assert_eq!(w.status(), Some(StatusCode::OK));
/// assert_eq!(w.body(), b"Hello");
/// ```
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    status: Option<StatusCode>,
    headers: HeaderMap,
    // Snapshot of `headers` taken when the status was sent.
    sent_headers: Option<HeaderMap>,
    body: Vec<u8>,
    flushed: bool,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The status that was sent, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Headers as sent with the status line, or the pending headers if
    /// nothing was sent yet.
    pub fn headers(&self) -> &HeaderMap {
        self.sent_headers.as_ref().unwrap_or(&self.headers)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether [`Flush::flush`] was ever called.
    pub fn flushed(&self) -> bool {
        self.flushed
    }

    fn start(&mut self) {
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }
    }
}

impl ResponseWriter for ResponseBuffer {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_some() {
            return;
        }
        self.status = Some(status);
        self.sent_headers = Some(self.headers.clone());
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.start();
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn as_flush(&mut self) -> Option<&mut dyn Flush> {
        Some(self)
    }

    fn as_write_from(&mut self) -> Option<&mut dyn WriteFrom> {
        Some(self)
    }
}

impl Flush for ResponseBuffer {
    fn flush(&mut self) -> io::Result<()> {
        self.start();
        self.flushed = true;
        Ok(())
    }
}

impl WriteFrom for ResponseBuffer {
    fn write_from(&mut self, src: &mut dyn Read) -> io::Result<u64> {
        self.start();
        let n = src.read_to_end(&mut self.body)?;
        Ok(n as u64)
    }
}
