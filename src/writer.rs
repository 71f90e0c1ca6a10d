//! The response-writing interface handlers talk to.
//!
//! # Required and optional capabilities
//!
//! Every transport can set a status, expose headers and write body bytes.
//! Some can do more: push buffered bytes to the client now ([`Flush`]), hand
//! the raw connection to the handler ([`Hijack`]), or pull a whole body from a
//! reader in one go ([`WriteFrom`]).
//!
//! The optional ones are discovered at call time through `as_*` queries that
//! return `None` by default:
//!
//! ```text
//! if let Some(f) = w.as_flush() {   ← transport can flush
//!     f.flush()?;
//! }                                 ← otherwise: nothing to do
//! ```
//!
//! Wrappers such as [`ObservedWriter`](crate::ObservedWriter) answer these
//! queries themselves and forward to whatever the wrapped writer offers, so
//! a capability survives any number of layers.

use std::io;

use http::{HeaderMap, StatusCode};
use hyper::upgrade::OnUpgrade;

use crate::error::Error;

/// A streaming HTTP response under construction.
///
/// The status line and headers go out with the first [`write_header`] or
/// [`write`]; header changes made after that point are not sent.
///
/// [`write_header`]: ResponseWriter::write_header
/// [`write`]: ResponseWriter::write
pub trait ResponseWriter: Send {
    /// Headers that will be sent with the status line.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sends the status line. Only the first call has any effect.
    fn write_header(&mut self, status: StatusCode);

    /// Writes body bytes, sending `200 OK` first if no status was sent yet.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn as_flush(&mut self) -> Option<&mut dyn Flush> {
        None
    }

    /// Whether a flush would reach a writer that can actually flush.
    ///
    /// Wrappers that always advertise [`Flush`] override this to ask the
    /// writer they wrap.
    fn can_flush(&mut self) -> bool {
        self.as_flush().is_some()
    }

    fn as_hijack(&mut self) -> Option<&mut dyn Hijack> {
        None
    }

    fn as_write_from(&mut self) -> Option<&mut dyn WriteFrom> {
        None
    }
}

/// Pushes buffered body bytes to the client immediately.
pub trait Flush {
    fn flush(&mut self) -> io::Result<()>;
}

/// Takes over the underlying connection.
///
/// The returned future resolves to the raw connection once the response head
/// (normally `101 Switching Protocols`) has been sent.
pub trait Hijack {
    fn hijack(&mut self) -> Result<OnUpgrade, Error>;
}

/// Copies an entire body from a reader, returning the number of bytes copied.
///
/// If the copy fails partway, every byte already read from the source is
/// part of the response.
pub trait WriteFrom {
    fn write_from(&mut self, src: &mut dyn io::Read) -> io::Result<u64>;
}

// `&mut W` is a writer too, so wrappers can hold a borrowed writer.
impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        (**self).write_header(status)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn as_flush(&mut self) -> Option<&mut dyn Flush> {
        (**self).as_flush()
    }

    fn can_flush(&mut self) -> bool {
        (**self).can_flush()
    }

    fn as_hijack(&mut self) -> Option<&mut dyn Hijack> {
        (**self).as_hijack()
    }

    fn as_write_from(&mut self) -> Option<&mut dyn WriteFrom> {
        (**self).as_write_from()
    }
}

/// [`std::io::Write`] view of a response body, for `write!` and `io::copy`.
///
/// `flush` forwards to the writer's [`Flush`] capability when it has one.
///
/// ```rust
/// use std::io::Write;
/// use reqlog::{ResponseBuffer, writer};
///
/// let mut w = ResponseBuffer::new();
/// write!(writer::body(&mut w), "{} items", 3).unwrap();
/// assert_eq!(w.body(), b"3 items");
/// ```
pub struct Body<'a, W: ?Sized>(&'a mut W);

/// Wraps `w` in a [`Body`].
pub fn body<W: ResponseWriter + ?Sized>(w: &mut W) -> Body<'_, W> {
    Body(w)
}

impl<W: ResponseWriter + ?Sized> io::Write for Body<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.as_flush() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}
