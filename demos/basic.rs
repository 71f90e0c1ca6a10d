//! Minimal reqlog example: request ids, access records and a streaming route.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/
//!   curl -N http://localhost:3000/stream
//!   curl -i http://localhost:3000/missing

use std::time::Duration;

use http::StatusCode;
use reqlog::middleware::{AccessLog, LoggerConfig, RequestId, Sink, logger, request_id};
use reqlog::{BoxFuture, Request, Response, ResponseWriter, Server, handler};
use tracing::level_filters::LevelFilter;

#[tokio::main]
async fn main() {
    // Server lifecycle messages.
    tracing_subscriber::fmt::init();

    // Access records on stdout, application messages from INFO up on stderr.
    let config = LoggerConfig::new(
        Sink::stdout(),
        Sink::builder().level(LevelFilter::INFO).build(std::io::stderr),
    );

    let app = RequestId::new(AccessLog::with_config(handler::from_writer_fn(route), config));

    Server::bind("0.0.0.0:3000")
        .expect("valid address")
        .serve(app)
        .await
        .expect("server error");
}

fn route<'a>(w: &'a mut dyn ResponseWriter, req: Request) -> BoxFuture<'a> {
    Box::pin(async move {
        let res = match req.path() {
            "/" => hello(&req),
            "/stream" => return stream(w).await,
            _ => Response::status(StatusCode::NOT_FOUND),
        };
        if let Err(e) = res.write_to(w) {
            tracing::debug!("client went away: {e}");
        }
    })
}

// GET / → greeting, echoing the request id
fn hello(req: &Request) -> Response {
    if let Some(log) = logger::from_request(req) {
        log.info("saying hello");
    }
    let id = request_id::from_request(req).unwrap_or("-");
    Response::text(format!("Hello, World! (request {id})\n"))
}

// GET /stream → five lines, one per 200 ms, each flushed as it is written
async fn stream(w: &mut dyn ResponseWriter) {
    for i in 1..=5 {
        if w.write(format!("tick {i}\n").as_bytes()).is_err() {
            return;
        }
        if let Some(f) = w.as_flush() {
            let _ = f.flush();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
