//! The response assembler.
//!
//! A [`Responder`] is built per response, configured with chained calls,
//! and consumed by [`Responder::send`]. It decides whether the payload is a
//! stream (buffer it under the configured limits) or a plain value
//! (normalize it), then shapes the result into the configured protocol's
//! [`Envelope`].
//!
//! ```rust
//! use reply::{Options, Responder, Status, Value};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), reply::Error> {
//! let envelope = Responder::new(Options::new().protocol("websocket"))?
//!     .status(Status::Created)?
//!     .send(Value::object([("id", 42)]))
//!     .await?;
//!
//! assert_eq!(envelope.status_code(), 201);
//! assert_eq!(envelope.content_type(), "application/json");
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use jiff::Timestamp;
use serde_json::Value as Json;
use tracing::debug;

use crate::config::{Options, ResponseConfig};
use crate::envelope::{Envelope, Headers, Parts};
use crate::error::{Error, Result};
use crate::normalize::{Body, normalize};
use crate::source::ByteSource;
use crate::status::Status;
use crate::value::{ErrorValue, Value, iso_timestamp};

// ── Payload ───────────────────────────────────────────────────────────────────

/// What a handler hands to [`Responder::send`]: a live byte stream or a
/// plain value.
pub enum Payload {
    Stream(Box<dyn ByteSource>),
    Value(Value),
}

impl Payload {
    pub fn stream(source: impl ByteSource + 'static) -> Self {
        Self::Stream(Box::new(source))
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(source) => f.debug_tuple("Stream").field(&source.kind()).finish(),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

impl From<Box<dyn ByteSource>> for Payload {
    fn from(source: Box<dyn ByteSource>) -> Self {
        Self::Stream(source)
    }
}

macro_rules! payload_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Payload {
                fn from(v: $ty) -> Self {
                    Self::Value(v.into())
                }
            }
        )*
    };
}

payload_from_value!(
    Value, &str, String, bool, i32, i64, u32, u64, usize, f64,
    Bytes, Vec<u8>, Json, Timestamp, ErrorValue, Body,
);

// ── Responder ─────────────────────────────────────────────────────────────────

/// Single-use response assembler.
#[derive(Debug)]
pub struct Responder {
    config: ResponseConfig,
    headers: Headers,
    status: Option<u16>,
}

impl Responder {
    /// Validates `options`. Fails on an unknown protocol, a zero limit or an
    /// unparsable content-type override.
    pub fn new(options: Options) -> Result<Self> {
        Ok(Self::from_config(ResponseConfig::try_from(options)?))
    }

    pub fn from_config(config: ResponseConfig) -> Self {
        let headers = config.headers().clone();
        Self { config, headers, status: None }
    }

    pub fn config(&self) -> &ResponseConfig {
        &self.config
    }

    /// Sets the status. Accepts a [`Status`] or any integer in `100..=599`,
    /// so a bare literal like `.status(404)` works.
    pub fn status(mut self, code: impl Into<i64>) -> Result<Self> {
        let code = code.into();
        match u16::try_from(code) {
            Ok(valid) if (100..=599).contains(&valid) => {
                self.status = Some(valid);
                Ok(self)
            }
            _ => Err(Error::InvalidStatus(code)),
        }
    }

    /// Adds or replaces a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Adds or replaces several headers.
    pub fn headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in headers {
            self.headers.insert(k, v);
        }
        self
    }

    /// Builds the envelope.
    ///
    /// Error-like values default the status to 500 unless a status was set.
    /// Stream failures other than timeout and size limit come back wrapped
    /// in [`Error::Send`] with the protocol and status attached.
    pub async fn send(self, payload: impl Into<Payload>) -> Result<Envelope> {
        let protocol = self.config.protocol();
        let forced = self.config.content_type().cloned();

        let (content_type, body, size, error) = match payload.into() {
            Payload::Stream(source) => match self.config.consumer().consume(source).await {
                Ok(result) => {
                    let content_type = forced.unwrap_or(result.content_type);
                    (content_type, Body::Binary(result.body), Some(result.size), false)
                }
                Err(err) => return Err(self.annotate(err)),
            },
            Payload::Value(value) => {
                let canonical = normalize(value, forced);
                let error = canonical.is_error();
                (canonical.content_type, canonical.body, None, error)
            }
        };

        let status = match self.status {
            Some(status) => status,
            None if error => Status::InternalServerError.code(),
            None => Status::Ok.code(),
        };
        debug!(%protocol, status, content_type = %content_type, size, "response assembled");

        let parts = Parts { status, content_type, body, size };
        Ok(Envelope::build(protocol, parts, &self.headers, iso_timestamp(Timestamp::now())))
    }

    fn annotate(&self, err: Error) -> Error {
        if err.is_self_describing() {
            return err;
        }
        Error::Send {
            protocol: self.config.protocol(),
            status: self.status.unwrap_or(Status::Ok.code()),
            source: Box::new(err),
        }
    }
}
