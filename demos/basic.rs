//! Minimal reply example: one hyper server, three kinds of payload.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl http://localhost:3000/files/Cargo.toml
//!   curl http://localhost:3000/files/missing.txt
//!   curl http://localhost:3000/files//etc/passwd      # 400
//!   curl -X POST http://localhost:3000/echo -d 'hello'
//!   curl http://localhost:3000/events/error

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use reply::{BodySource, Error, ErrorValue, FileSource, Options, Payload, Responder, Status, Value};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let addr: SocketAddr = "127.0.0.1:3000".parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "reply demo listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            let svc = service_fn(handle);
            if let Err(e) = ConnBuilder::new(TokioExecutor::new()).serve_connection(io, svc).await {
                error!(%peer, "connection error: {e}");
            }
        });
    }
}

async fn handle(req: hyper::Request<Incoming>) -> Result<http::Response<Full<Bytes>>, Infallible> {
    Ok(match route(req).await.and_then(|env| env.into_http()) {
        Ok(res) => res,
        Err(e) => failure(&e),
    })
}

async fn route(req: hyper::Request<Incoming>) -> reply::Result<reply::Envelope> {
    let path = req.uri().path().to_owned();

    if let Some(id) = path.strip_prefix("/users/") {
        get_user(id).await
    } else if let Some(name) = path.strip_prefix("/files/") {
        get_file(name).await
    } else if path == "/echo" {
        echo(req.into_body()).await
    } else if path == "/events/error" {
        event_error().await
    } else {
        Responder::new(Options::new())?.status(Status::NotFound)?.send("not found").await
    }
}

// GET /users/:id → JSON object
async fn get_user(id: &str) -> reply::Result<reply::Envelope> {
    Responder::new(Options::new())?
        .send(Value::object([("id", Value::from(id)), ("name", Value::from("alice"))]))
        .await
}

// Files are served from here and nowhere else.
const PUBLIC_DIR: &str = ".";

// GET /files/:name → file buffered as application/octet-stream
async fn get_file(name: &str) -> reply::Result<reply::Envelope> {
    let Some(path) = resolve(name) else {
        return Responder::new(Options::new())?
            .status(Status::BadRequest)?
            .send("invalid file name")
            .await;
    };
    let options = Options::new().error_handler(|err| {
        (err.kind() == std::io::ErrorKind::NotFound)
            .then(|| Error::custom(Status::NotFound, "no such file"))
    });
    Responder::new(options)?.send(Payload::stream(FileSource::open(path))).await
}

/// Joins `name` onto [`PUBLIC_DIR`]. Only plain relative segments are
/// accepted: no root, no prefix, no `.` or `..`.
fn resolve(name: &str) -> Option<PathBuf> {
    let relative = Path::new(name);
    let mut components = relative.components().peekable();
    components.peek()?;
    components
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| Path::new(PUBLIC_DIR).join(relative))
}

// POST /echo → request body buffered and sent back
async fn echo(body: Incoming) -> reply::Result<reply::Envelope> {
    Responder::new(Options::new().max_stream_bytes(64 * 1024))?
        .send(Payload::stream(BodySource::new(body)))
        .await
}

// GET /events/error → an error value in the event shape, status 500
async fn event_error() -> reply::Result<reply::Envelope> {
    Responder::new(Options::new().protocol("sse"))?
        .send(ErrorValue::new("Error", "something broke").with_extra("retry", true))
        .await
}

fn failure(err: &Error) -> http::Response<Full<Bytes>> {
    error!(status = err.status(), "request failed: {err}");
    let mut res = http::Response::new(Full::new(Bytes::from(err.to_string())));
    *res.status_mut() = http::StatusCode::from_u16(err.status())
        .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
    res
}
