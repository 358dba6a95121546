use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::Full;
use reply::{
    Body, BodySource, ChannelSource, DiagnosticSink, Envelope, Error, ErrorValue, FileSource,
    Limits, Options, Payload, Protocol, Responder, Responders, SourceKind, Status, Value,
    consume, responder,
};
use serde_json::json;

async fn send(protocol: &str, payload: impl Into<Payload>) -> Envelope {
    Responder::new(Options::new().protocol(protocol))
        .unwrap()
        .send(payload)
        .await
        .unwrap()
}

#[tokio::test]
async fn same_value_three_shapes() {
    let value = || Value::object([("ok", true)]);

    let http = serde_json::to_value(send("http", value()).await).unwrap();
    assert_eq!(
        http,
        json!({
            "statusCode": 200,
            "headers": { "Content-Type": "application/json" },
            "body": { "ok": true },
        })
    );

    let ws = serde_json::to_value(send("websocket", value()).await).unwrap();
    assert_eq!(ws["statusCode"], 200);
    assert_eq!(ws["body"], json!({ "ok": true }));
    assert_eq!(ws["type"], "application/json");
    assert!(ws["timestamp"].as_str().unwrap().ends_with('Z'));
    assert!(ws.get("size").is_none());

    let sse = serde_json::to_value(send("sse", value()).await).unwrap();
    assert_eq!(sse["message"], json!({ "ok": true }));
    assert!(sse.get("body").is_none());
}

#[tokio::test]
async fn sniffed_strings() {
    let cases = [
        (r#"{"a":1}"#, "application/json"),
        ("<?xml version=\"1.0\"?><r/>", "application/xml"),
        ("<svg xmlns=\"http://www.w3.org/2000/svg\"></svg>", "image/svg+xml"),
        ("<p>hi</p>", "text/html"),
        ("body { color: red; }", "text/css"),
        ("dGVzdA==", "application/base64"),
        ("  just words  ", "text/plain"),
    ];
    for (input, expected) in cases {
        assert_eq!(send("http", input).await.content_type(), expected, "{input:?}");
    }
    assert_eq!(send("http", "  just words  ").await.body(), &Body::Text("just words".into()));
}

#[tokio::test]
async fn stream_is_buffered_with_size() {
    let (tx, source) = ChannelSource::channel(4);
    tx.send(Ok("a".into())).await.unwrap();
    tx.send(Ok("bc".into())).await.unwrap();
    drop(tx);

    let env = send("websocket", Payload::stream(source)).await;
    assert_eq!(env.size(), Some(3));
    assert_eq!(env.body(), &Body::Binary(Bytes::from_static(b"abc")));

    // binary travels as base64 in the message shape
    let json = serde_json::to_value(&env).unwrap();
    assert_eq!(json["body"], "YWJj");
    assert_eq!(json["size"], 3);
}

#[tokio::test]
async fn size_limit_is_strict() {
    let (tx, source) = ChannelSource::channel(4);
    tx.send(Ok("ab".into())).await.unwrap();
    tx.send(Ok("c".into())).await.unwrap();

    let err = Responder::new(Options::new().max_stream_bytes(2))
        .unwrap()
        .send(Payload::stream(source))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StreamSizeLimit { limit: 2, actual: 3 }), "{err:?}");
    assert_eq!(err.status(), 413);
    assert!(tx.is_closed(), "source should be released");
}

#[tokio::test]
async fn silent_stream_times_out() {
    let (tx, source) = ChannelSource::channel(1);

    let started = Instant::now();
    let err = Responder::new(Options::new().stream_timeout_ms(20))
        .unwrap()
        .send(Payload::stream(source))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StreamTimeout { timeout_ms: 20 }), "{err:?}");
    assert!(started.elapsed() >= Duration::from_millis(20));
    assert!(tx.is_closed());
}

#[tokio::test]
async fn missing_file_is_remapped_by_handler() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.txt");

    let options = Options::new().error_handler(|err| {
        (err.kind() == io::ErrorKind::NotFound).then(|| Error::custom(Status::NotFound, "no such file"))
    });
    let err = Responder::new(options)
        .unwrap()
        .send(Payload::stream(FileSource::open(&path)))
        .await
        .unwrap_err();

    assert_eq!(err.status(), 404);
    assert!(err.to_string().contains("no such file"), "{err}");
    assert!(matches!(err.root(), Error::Custom { status: 404, .. }));
}

#[tokio::test]
async fn missing_file_without_handler_is_classified() {
    let dir = tempfile::tempdir().unwrap();
    let err = Responder::new(Options::new())
        .unwrap()
        .send(Payload::stream(FileSource::open(dir.path().join("gone"))))
        .await
        .unwrap_err();
    assert_eq!(err.status(), 404);
    assert!(matches!(err, Error::Send { protocol: Protocol::RequestResponse, status: 200, .. }));
}

#[tokio::test]
async fn file_contents_come_through() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.bin");
    std::fs::write(&path, b"\x00\x01\x02").unwrap();

    let env = send("http", Payload::stream(FileSource::open(&path))).await;
    assert_eq!(env.content_type(), "application/octet-stream");
    assert_eq!(env.size(), Some(3));
}

#[tokio::test]
async fn http_body_source() {
    let body = Full::new(Bytes::from_static(b"hello"));
    let result = consume(BodySource::new(body), Limits::default()).await.unwrap();
    assert_eq!(result.body, Bytes::from_static(b"hello"));
    assert_eq!(result.size, 5);
    assert_eq!(result.content_type, SourceKind::Emitter.content_type());
}

#[tokio::test]
async fn errors_default_to_500_and_keep_explicit_status() {
    let env = send("sse", ErrorValue::new("TypeError", "bad input").with_extra("field", "name")).await;
    assert_eq!(env.status_code(), 500);
    let message = env.body().as_json().unwrap();
    assert_eq!(message["name"], "TypeError");
    assert_eq!(message["field"], "name");

    let env = responder("http", "badRequest", Options::new())
        .unwrap()
        .send(ErrorValue::new("Error", "nope"))
        .await
        .unwrap();
    assert_eq!(env.status_code(), 400);
}

#[tokio::test]
async fn responders_cover_the_status_table() {
    let r = Responders::for_protocol(Protocol::RequestResponse);
    let env = r.no_content(Value::Null).await.unwrap();
    assert_eq!(env.status_code(), 204);
    assert_eq!(env.body(), &Body::Empty);
    assert_eq!(r.service_unavailable("later").await.unwrap().status_code(), 503);
}

#[tokio::test]
async fn into_http_for_message_shape_is_json() {
    let env = send("ws", "hi").await;
    let res = env.into_http().unwrap();
    assert_eq!(res.headers()["content-type"], "application/json");
}

#[derive(Default)]
struct Collect(Mutex<Vec<String>>);

impl DiagnosticSink for Collect {
    fn release_failed(&self, kind: SourceKind, err: &io::Error) {
        self.0.lock().unwrap().push(format!("{kind:?}: {err}"));
    }
}

#[tokio::test]
async fn custom_diagnostics_sink_is_accepted() {
    let sink = Arc::new(Collect::default());
    let (tx, source) = ChannelSource::channel(1);
    tx.send(Ok("x".into())).await.unwrap();
    drop(tx);

    let env = Responder::new(Options::new().diagnostics(sink.clone()))
        .unwrap()
        .send(Payload::stream(source))
        .await
        .unwrap();
    assert_eq!(env.size(), Some(1));
    // channel release never fails
    assert!(sink.0.lock().unwrap().is_empty());
}
