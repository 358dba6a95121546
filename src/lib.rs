//! # reply
//!
//! Protocol-agnostic response formatting for Rust services.
//!
//! A handler produces *something*: a string, a JSON document, an error, a
//! date, bytes, or a live byte stream. reply turns it into one canonical
//! `(content type, body)` pair and shapes that pair for the transport in
//! use.
//!
//! ## The pipeline
//!
//! 1. **Normalize.** Plain values are classified by kind and, for text,
//!    sniffed: JSON, XML, SVG, HTML, CSS, base64, then plain text.
//!    Normalizing never fails; values that cannot be encoded fall back to
//!    their text rendering.
//! 2. **Consume.** Streams are buffered under a timeout and a byte budget.
//!    Every outcome (chunk, error, end, timeout) settles the result exactly
//!    once and the source is released exactly once.
//! 3. **Envelope.** The pair is wrapped for one of three protocols:
//!    request-response (`http`), message (`websocket`) or event (`sse`).
//!
//! ## Quick start
//!
//! ```rust
//! use reply::{ChannelSource, Options, Payload, Responder, Status, Value};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), reply::Error> {
//! // A value: sniffed and shaped.
//! let envelope = Responder::new(Options::new())?
//!     .status(Status::Created)?
//!     .header("location", "/users/99")
//!     .send(Value::object([("id", 99)]))
//!     .await?;
//! assert_eq!(envelope.content_type(), "application/json");
//!
//! // A stream: buffered under the configured limits.
//! let (tx, source) = ChannelSource::channel(8);
//! tx.send(Ok("chunk".into())).await.unwrap();
//! drop(tx);
//!
//! let envelope = Responder::new(Options::new().protocol("sse"))?
//!     .send(Payload::stream(source))
//!     .await?;
//! assert_eq!(envelope.size(), Some(5));
//! # Ok(())
//! # }
//! ```

mod config;
mod consume;
mod content_type;
mod diagnostics;
mod envelope;
mod error;
mod normalize;
mod responders;
mod response;
mod source;
mod status;
mod value;

pub use config::{Options, Protocol, ResponseConfig};
pub use consume::{
    DEFAULT_MAX_STREAM_BYTES, DEFAULT_STREAM_TIMEOUT_MS, ErrorHandler, Limits, StreamConsumer,
    StreamResult, consume,
};
pub use content_type::ContentType;
pub use diagnostics::{DiagnosticSink, TracingSink};
pub use envelope::{Envelope, EventEnvelope, Headers, HttpEnvelope, MessageEnvelope};
pub use error::{Error, Result, StatusClass};
pub use normalize::{Body, CanonicalBody, is_base64, normalize, sniff};
pub use responders::{Responders, responder};
pub use response::{Payload, Responder};
pub use source::{BodySource, ByteSource, ChannelSource, Chunk, FileSource, SourceKind};
pub use status::Status;
pub use value::{EncodeError, ErrorValue, Shared, Value};
