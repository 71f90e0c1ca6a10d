use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use http::header::CONTENT_LENGTH;
use http::{HeaderValue, StatusCode};
use reqlog::middleware::{AccessLog, Format, LoggerConfig, RequestId, Sink};
use reqlog::{Error, Handler, ResponseWriter, handler, serve_listener};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn records(&self) -> Vec<serde_json::Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Capture {
    type Writer = Capture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<(), Error>>,
}

impl Running {
    async fn stop(self) {
        self.stop.send(()).unwrap();
        self.task.await.unwrap().unwrap();
    }
}

async fn start(app: impl Handler) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(serve_listener(listener, app, async {
        let _ = rx.await;
    }));
    Running { addr, stop, task }
}

async fn get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let raw = format!(
        "GET {path} HTTP/1.1\r\nHost: localhost\r\nUser-Agent: it/1\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

fn header<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    let (head, _) = response.split_once("\r\n\r\n")?;
    head.lines().skip(1).find_map(|line| {
        let (n, v) = line.split_once(':')?;
        n.eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

#[tokio::test]
async fn tagged_and_logged_end_to_end() {
    let access = Capture::default();
    let config = LoggerConfig::new(
        Sink::builder().format(Format::Json).strip_level(true).build(access.clone()),
        Sink::builder().format(Format::Json).build(io::sink),
    );
    async fn hello(_req: reqlog::Request) -> &'static str {
        "Hello, World!"
    }
    let server =
        start(RequestId::new(AccessLog::with_config(handler::from_fn(hello), config))).await;

    let response = get(server.addr, "/hello").await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.ends_with("\r\n\r\nHello, World!"), "{response}");
    let id = header(&response, "x-request-id").expect("request id header");
    assert_eq!(id.len(), 26);

    let records = access.records();
    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert_eq!(r["request_id"], id);
    assert_eq!(r["remote_ip"], "127.0.0.1");
    assert_eq!(r["request"], "GET /hello HTTP/1.1");
    assert_eq!(r["response"], 200);
    assert_eq!(r["bytes"], 13);
    assert_eq!(r["agent"], "it/1");
    assert_eq!(r["referer"], "");

    server.stop().await;
}

#[tokio::test]
async fn flushed_writes_arrive_as_separate_chunks() {
    let app = handler::from_writer_fn(|w, _req| {
        Box::pin(async move {
            w.write(b"first").unwrap();
            w.as_flush().expect("server writer flushes").flush().unwrap();
            w.write(b"second").unwrap();
        })
    });
    let server = start(app).await;

    let response = get(server.addr, "/").await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert_eq!(header(&response, "transfer-encoding"), Some("chunked"));
    assert!(response.contains("\r\n5\r\nfirst\r\n6\r\nsecond\r\n0\r\n\r\n"), "{response}");

    server.stop().await;
}

#[tokio::test]
async fn large_body_streams_through_backpressure() {
    const TOTAL: usize = 4 * 1024 * 1024;
    let app = handler::from_writer_fn(|w, _req| {
        Box::pin(async move {
            w.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from(TOTAL));
            let block = vec![b'x'; 64 * 1024];
            for _ in 0..TOTAL / block.len() {
                let mut rest = &block[..];
                while !rest.is_empty() {
                    match w.write(rest) {
                        Ok(n) => rest = &rest[n..],
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            tokio::task::yield_now().await
                        }
                        Err(e) => panic!("write failed: {e}"),
                    }
                }
            }
        })
    });
    let server = start(app).await;

    let response = get(server.addr, "/").await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{}", response.lines().next().unwrap_or(""));
    let (_, body) = response.split_once("\r\n\r\n").unwrap();
    assert_eq!(body.len(), TOTAL);

    server.stop().await;
}

#[tokio::test]
async fn status_without_body() {
    let app = handler::from_writer_fn(|w: &mut dyn ResponseWriter, _req| {
        Box::pin(async move {
            w.write_header(StatusCode::NOT_FOUND);
        })
    });
    let server = start(app).await;

    let response = get(server.addr, "/missing").await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"), "{response}");

    server.stop().await;
}

#[tokio::test]
async fn panic_before_head_is_a_500() {
    fn boom() {
        panic!("boom")
    }
    let app = handler::from_writer_fn(|_w, _req| Box::pin(async { boom() }));
    let server = start(app).await;

    let response = get(server.addr, "/").await;
    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{response}");

    server.stop().await;
}

#[tokio::test]
async fn server_stops_on_signal() {
    let server = start(handler::from_fn(|_req| async { StatusCode::NO_CONTENT })).await;
    let response = get(server.addr, "/").await;
    assert!(response.starts_with("HTTP/1.1 204 No Content\r\n"), "{response}");

    let addr = server.addr;
    server.stop().await;
    assert!(TcpStream::connect(addr).await.is_err());
}
