//! HTTP server, streaming response writer and graceful shutdown.
//!
//! # From hyper to handlers
//!
//! hyper wants a finished `Response` value back from its service; handlers
//! want to write a response incrementally. The two are joined per request:
//!
//! ```text
//! hyper service ──spawn──▶ handler task
//!      │                      │ write_header / first write / flush
//!      │◀──── oneshot: head ──┘
//!      │                      │ body chunks (flush, or every 8 KiB)
//!      │◀──── mpsc: Bytes ────┘ channel closes when the handler returns
//! ```
//!
//! A handler that returns without writing anything sends `200 OK` with an
//! empty body. A handler that panics before sending a head produces
//! `500 Internal Server Error`; after the head, the body is cut short.
//!
//! # Slow clients
//!
//! At most 16 chunks wait in the channel. Beyond that, writes collect in the
//! writer's own buffer, up to 1 MiB; a write that finds this buffer full
//! fails with [`io::ErrorKind::WouldBlock`]. A handler streaming large
//! bodies should yield to the runtime and retry when it sees that error.
//!
//! # Graceful shutdown and Kubernetes
//!
//! On **SIGTERM** (or Ctrl-C) the server stops accepting connections, lets
//! every in-flight connection finish, then returns from [`Server::serve`].
//! Set `terminationGracePeriodSeconds` longer than your slowest request.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body_util::BodyExt;
use hyper::body::{Body, Frame, Incoming};
use hyper::service::service_fn;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::writer::{Flush, Hijack, ResponseWriter};

/// Buffered body bytes are sent once they reach this size.
const CHUNK_SIZE: usize = 8 * 1024;

/// Chunks queued for the client before writes stay in the writer's buffer.
const QUEUED_CHUNKS: usize = 16;

/// Writer buffer size at which writes fail with `WouldBlock`.
const MAX_PENDING: usize = 1024 * 1024;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to listen on `addr` (`host:port`).
    ///
    /// ```rust,no_run
    /// use reqlog::Server;
    /// let server = Server::bind("0.0.0.0:3000").unwrap();
    /// # let _ = server;
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        Ok(Self { addr: addr.parse()? })
    }

    /// Serves `handler` until SIGTERM or Ctrl-C, then drains in-flight
    /// connections.
    pub async fn serve(self, handler: impl Handler) -> Result<(), Error> {
        self.serve_with_shutdown(handler, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but stops when `signal` resolves.
    pub async fn serve_with_shutdown(
        self,
        handler: impl Handler,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        serve_listener(listener, handler, signal).await
    }
}

/// Serves `handler` on an already bound listener until `shutdown` resolves.
pub async fn serve_listener(
    listener: TcpListener,
    handler: impl Handler,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Error> {
    let handler: BoxedHandler = Arc::new(handler);
    let addr = listener.local_addr()?;

    info!(%addr, "reqlog listening");

    let mut tasks = tokio::task::JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Check shutdown first so no new connection slips in after it.
            biased;

            () = &mut shutdown => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let handler = Arc::clone(&handler);
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    // Called once per request on the connection.
                    let svc = service_fn(move |req| {
                        let handler = Arc::clone(&handler);
                        async move { dispatch(handler, req, remote_addr).await }
                    });

                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection_with_upgrades(io, svc)
                        .await
                    {
                        debug!(peer = %remote_addr, "connection error: {e}");
                    }
                });
            }

            // Reap finished connections so the set stays small.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}

    info!("reqlog stopped");
    Ok(())
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Runs one request: reads the body, starts the handler task, and answers
/// hyper as soon as the handler has sent its response head.
async fn dispatch(
    handler: BoxedHandler,
    mut req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<ChannelBody>, Infallible> {
    let upgrade = hyper::upgrade::on(&mut req);
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(peer = %remote_addr, "failed to read request body: {e}");
            return Ok(ChannelBody::status_only(StatusCode::BAD_REQUEST));
        }
    };
    let request = Request::new(parts, body, remote_addr.to_string());

    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(QUEUED_CHUNKS);

    tokio::spawn(async move {
        let mut writer = StreamWriter::new(head_tx, body_tx, upgrade);
        handler.serve(&mut writer, request).await;
        writer.finish().await;
    });

    match head_rx.await {
        Ok(head) => Ok(http::Response::from_parts(head, ChannelBody { rx: body_rx })),
        Err(_) => {
            error!(peer = %remote_addr, "handler panicked before sending a response");
            Ok(ChannelBody::status_only(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

// ── Streaming writer ──────────────────────────────────────────────────────────

/// The [`ResponseWriter`] handed to handlers by the server.
struct StreamWriter {
    // `None` once the head is sent.
    head: Option<oneshot::Sender<http::response::Parts>>,
    headers: HeaderMap,
    buf: BytesMut,
    body: mpsc::Sender<Bytes>,
    upgrade: Option<OnUpgrade>,
}

impl StreamWriter {
    fn new(
        head: oneshot::Sender<http::response::Parts>,
        body: mpsc::Sender<Bytes>,
        upgrade: OnUpgrade,
    ) -> Self {
        Self {
            head: Some(head),
            headers: HeaderMap::new(),
            buf: BytesMut::new(),
            body,
            upgrade: Some(upgrade),
        }
    }

    fn started(&self) -> bool {
        self.head.is_none()
    }

    /// Sends the head. Returns `false` if it was already sent.
    fn send_head(&mut self, status: StatusCode) -> bool {
        let Some(tx) = self.head.take() else {
            return false;
        };
        let mut res = http::Response::new(());
        *res.status_mut() = status;
        *res.headers_mut() = std::mem::take(&mut self.headers);
        let (parts, ()) = res.into_parts();
        // The receiver is gone only if hyper dropped the request.
        let _ = tx.send(parts);
        true
    }

    fn start(&mut self) {
        if !self.started() {
            self.send_head(StatusCode::OK);
        }
    }

    /// Queues the buffer as one chunk. A full channel leaves it buffered.
    fn send_chunk(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        match self.body.try_reserve() {
            Ok(permit) => {
                permit.send(self.buf.split().freeze());
                Ok(())
            }
            Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Closed(())) => Err(io::ErrorKind::BrokenPipe.into()),
        }
    }

    async fn finish(mut self) {
        self.start();
        if self.buf.is_empty() {
            return;
        }
        let chunk = self.buf.split().freeze();
        if self.body.send(chunk).await.is_err() {
            debug!("client went away before the response ended");
        }
    }
}

impl ResponseWriter for StreamWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if !self.send_head(status) {
            debug!(%status, "status already sent, ignoring");
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.start();
        if self.body.is_closed() {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        if self.buf.len() >= CHUNK_SIZE {
            self.send_chunk()?;
        }
        let room = MAX_PENDING.saturating_sub(self.buf.len());
        if room == 0 && !buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "client is not reading the response fast enough",
            ));
        }
        let n = buf.len().min(room);
        self.buf.extend_from_slice(&buf[..n]);
        if self.buf.len() >= CHUNK_SIZE {
            self.send_chunk()?;
        }
        Ok(n)
    }

    fn as_flush(&mut self) -> Option<&mut dyn Flush> {
        Some(self)
    }

    fn as_hijack(&mut self) -> Option<&mut dyn Hijack> {
        Some(self)
    }
}

impl Flush for StreamWriter {
    fn flush(&mut self) -> io::Result<()> {
        self.start();
        self.send_chunk()
    }
}

impl Hijack for StreamWriter {
    fn hijack(&mut self) -> Result<OnUpgrade, Error> {
        self.upgrade.take().ok_or(Error::Hijacked)
    }
}

// ── Response body ─────────────────────────────────────────────────────────────

/// Response body fed by the handler task through a channel.
struct ChannelBody {
    rx: mpsc::Receiver<Bytes>,
}

impl ChannelBody {
    fn status_only(status: StatusCode) -> http::Response<Self> {
        let (_, rx) = mpsc::channel(1);
        let mut res = http::Response::new(Self { rx });
        *res.status_mut() = status;
        res
    }
}

impl Body for ChannelBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        self.rx.poll_recv(cx).map(|chunk| chunk.map(|data| Ok(Frame::data(data))))
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or Ctrl-C (Ctrl-C only off Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer() -> (
        StreamWriter,
        oneshot::Receiver<http::response::Parts>,
        mpsc::Receiver<Bytes>,
    ) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(QUEUED_CHUNKS);
        let upgrade = hyper::upgrade::on(&mut http::Request::new(()));
        (StreamWriter::new(head_tx, body_tx, upgrade), head_rx, body_rx)
    }

    #[test]
    fn head_carries_status_and_headers() {
        let (mut w, mut head, _body) = writer();
        w.headers_mut().insert("x-a", http::HeaderValue::from_static("1"));
        w.write_header(StatusCode::CREATED);
        w.write_header(StatusCode::OK);

        let parts = head.try_recv().unwrap();
        assert_eq!(parts.status, StatusCode::CREATED);
        assert_eq!(parts.headers.get("x-a").unwrap(), "1");
    }

    #[test]
    fn small_writes_are_buffered_until_flush() {
        let (mut w, mut head, mut body) = writer();
        w.write(b"abc").unwrap();
        assert_eq!(head.try_recv().unwrap().status, StatusCode::OK);
        assert!(body.try_recv().is_err());

        w.flush().unwrap();
        assert_eq!(body.try_recv().unwrap(), Bytes::from_static(b"abc"));
    }

    #[test]
    fn large_writes_go_out_immediately() {
        let (mut w, _head, mut body) = writer();
        w.write(&[b'x'; CHUNK_SIZE]).unwrap();
        assert_eq!(body.try_recv().unwrap().len(), CHUNK_SIZE);
    }

    #[tokio::test]
    async fn finish_sends_default_head_and_rest() {
        let (mut w, mut head, mut body) = writer();
        w.buf.extend_from_slice(b"tail");
        w.finish().await;

        assert_eq!(head.try_recv().unwrap().status, StatusCode::OK);
        assert_eq!(body.try_recv().unwrap(), Bytes::from_static(b"tail"));
        assert!(body.try_recv().is_err());
    }

    #[test]
    fn unread_body_is_capped() {
        let (mut w, _head, mut body) = writer();
        let chunk = [b'x'; CHUNK_SIZE];
        let mut accepted = 0;
        let err = loop {
            match w.write(&chunk) {
                Ok(n) => accepted += n,
                Err(e) => break e,
            }
        };

        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert_eq!(accepted, QUEUED_CHUNKS * CHUNK_SIZE + MAX_PENDING);

        // Once the client takes a chunk the backlog can go out again.
        body.try_recv().unwrap();
        w.flush().unwrap();
        assert!(w.buf.is_empty());
        assert_eq!(w.write(b"more").unwrap(), 4);
    }

    #[test]
    fn write_near_the_cap_is_partial() {
        let (mut w, _head, _body) = writer();
        for _ in 0..QUEUED_CHUNKS {
            w.body.try_send(Bytes::new()).unwrap();
        }
        w.write_header(StatusCode::OK);
        w.buf.extend_from_slice(&vec![b'x'; MAX_PENDING - 3]);

        assert_eq!(w.write(b"abcdef").unwrap(), 3);
    }

    #[test]
    fn write_fails_once_client_is_gone() {
        let (mut w, _head, body) = writer();
        drop(body);
        let err = w.write(b"late").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn hijack_only_once() {
        let (mut w, _head, _body) = writer();
        assert!(w.hijack().is_ok());
        assert!(matches!(w.hijack(), Err(Error::Hijacked)));
    }
}
