//! Response writer that records what it sees.

use std::io::{self, Read};

use http::{HeaderMap, StatusCode};
use hyper::upgrade::OnUpgrade;

use crate::error::Error;
use crate::writer::{self, Flush, Hijack, ResponseWriter, WriteFrom};

/// Wraps a [`ResponseWriter`] and records the status and body size of the
/// response passing through it.
///
/// Everything is forwarded unchanged. The status is fixed by the first
/// [`write_header`], or implicitly as `200 OK` by the first body write; later
/// calls neither change it nor reach the wrapped writer.
///
/// Optional capabilities are always advertised and resolved against the
/// wrapped writer when used:
///
/// | capability | wrapped writer has it | wrapped writer lacks it |
/// |---|---|---|
/// | [`Flush`] | forwarded | no-op |
/// | [`Hijack`] | forwarded | [`Error::Unsupported`] |
/// | [`WriteFrom`] | forwarded | copied through [`write`] |
///
/// [`write_header`]: ResponseWriter::write_header
/// [`write`]: ResponseWriter::write
///
/// ```rust
/// use http::StatusCode;
/// use reqlog::{ObservedWriter, ResponseBuffer, ResponseWriter};
///
/// let mut w = ObservedWriter::new(ResponseBuffer::new());
/// assert!(!w.has_started());
///
/// w.write(b"Hello, World!").unwrap();
///
/// assert_eq!(w.status(), Some(StatusCode::OK));
/// assert_eq!(w.size(), 13);
/// assert!(w.has_started());
/// ```
#[derive(Debug)]
pub struct ObservedWriter<W> {
    inner: W,
    status: Option<StatusCode>,
    size: u64,
}

impl<W: ResponseWriter> ObservedWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, status: None, size: 0 }
    }

    /// The recorded status, or `None` while the response has not begun.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Body bytes accepted by the wrapped writer so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether the status line has been sent.
    pub fn has_started(&self) -> bool {
        self.status.is_some()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// The wrapped writer. Writing through it bypasses the bookkeeping.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn start(&mut self) {
        if !self.has_started() {
            self.write_header(StatusCode::OK);
        }
    }
}

impl<W: ResponseWriter> ResponseWriter for ObservedWriter<W> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.has_started() {
            return;
        }
        self.status = Some(status);
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.start();
        let n = self.inner.write(buf)?;
        self.size += n as u64;
        Ok(n)
    }

    fn as_flush(&mut self) -> Option<&mut dyn Flush> {
        Some(self)
    }

    fn can_flush(&mut self) -> bool {
        self.inner.can_flush()
    }

    fn as_hijack(&mut self) -> Option<&mut dyn Hijack> {
        Some(self)
    }

    fn as_write_from(&mut self) -> Option<&mut dyn WriteFrom> {
        Some(self)
    }
}

impl<W: ResponseWriter> Flush for ObservedWriter<W> {
    fn flush(&mut self) -> io::Result<()> {
        if !self.inner.can_flush() {
            return Ok(());
        }
        // A flush puts the head on the wire, so it counts as the start.
        self.start();
        match self.inner.as_flush() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

impl<W: ResponseWriter> Hijack for ObservedWriter<W> {
    fn hijack(&mut self) -> Result<OnUpgrade, Error> {
        match self.inner.as_hijack() {
            Some(h) => h.hijack(),
            None => Err(Error::Unsupported("hijack")),
        }
    }
}

impl<W: ResponseWriter> WriteFrom for ObservedWriter<W> {
    fn write_from(&mut self, src: &mut dyn Read) -> io::Result<u64> {
        self.start();
        if let Some(bulk) = self.inner.as_write_from() {
            let mut counted = Counted { src, read: 0 };
            let res = bulk.write_from(&mut counted);
            // On failure, whatever was read has already reached the inner writer.
            self.size += match &res {
                Ok(n) => *n,
                Err(_) => counted.read,
            };
            return res;
        }
        // `write` keeps `size` exact even if the copy fails halfway.
        io::copy(src, &mut writer::body(self))
    }
}

/// Source reader that keeps track of how much was pulled through it.
struct Counted<'a> {
    src: &'a mut dyn Read,
    read: u64,
}

impl Read for Counted<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.src.read(buf)?;
        self.read += n as u64;
        Ok(n)
    }
}
