//! Per-responder configuration.
//!
//! [`Options`] is the loose, chainable input; [`ResponseConfig`] is the
//! validated, immutable result. Validation happens once, when a
//! [`Responder`](crate::Responder) is built, and a failure never leaves a
//! half-built responder behind.
//!
//! ## Environment variables
//!
//! [`Options::from_env`] reads:
//!
//! | Variable | Option | Default |
//! |---|---|---|
//! | `REPLY_PROTOCOL` | protocol identifier | `http` |
//! | `REPLY_STREAM_TIMEOUT_MS` | stream timeout | `30000` |
//! | `REPLY_MAX_STREAM_BYTES` | stream byte budget | `52428800` |
//! | `REPLY_CONTENT_TYPE` | content-type override | none |
//!
//! Unparsable numbers fall back to their defaults. An unknown protocol is
//! kept as given and rejected at construction like any other.

use std::env;
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::consume::{DEFAULT_MAX_STREAM_BYTES, DEFAULT_STREAM_TIMEOUT_MS, ErrorHandler, Limits, StreamConsumer};
use crate::content_type::ContentType;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::envelope::Headers;
use crate::error::{Error, Result};

// ── Protocol ──────────────────────────────────────────────────────────────────

/// Envelope style.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Protocol {
    /// `{ statusCode, headers, body, size? }`
    #[default]
    RequestResponse,
    /// `{ statusCode, body, type, timestamp, size? }`
    Message,
    /// `{ statusCode, message, type, timestamp, size? }`
    Event,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Self::RequestResponse, Self::Message, Self::Event];

    /// Canonical identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequestResponse => "http",
            Self::Message         => "websocket",
            Self::Event           => "sse",
        }
    }
}

/// Accepts the canonical identifiers plus a few aliases. Case-sensitive.
impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "http" | "request-response"       => Ok(Self::RequestResponse),
            "websocket" | "ws" | "message"    => Ok(Self::Message),
            "sse" | "event"                   => Ok(Self::Event),
            other                             => Err(Error::InvalidProtocol(other.to_owned())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Options ───────────────────────────────────────────────────────────────────

/// Construction options for a [`Responder`](crate::Responder).
///
/// ```rust
/// use reply::{Error, Options, Responder, Status};
///
/// # fn main() -> Result<(), Error> {
/// let responder = Responder::new(
///     Options::new()
///         .protocol("sse")
///         .header("cache-control", "no-store")
///         .stream_timeout_ms(5_000)
///         .error_handler(|err| {
///             (err.kind() == std::io::ErrorKind::NotFound)
///                 .then(|| Error::custom(Status::NotFound, "no such report"))
///         }),
/// )?;
/// # let _ = responder;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Options {
    protocol: String,
    headers: Headers,
    stream_timeout_ms: u64,
    max_stream_bytes: u64,
    content_type: Option<String>,
    error_handler: Option<ErrorHandler>,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            protocol: Protocol::default().as_str().to_owned(),
            headers: Headers::new(),
            stream_timeout_ms: DEFAULT_STREAM_TIMEOUT_MS,
            max_stream_bytes: DEFAULT_MAX_STREAM_BYTES,
            content_type: None,
            error_handler: None,
            diagnostics: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("protocol", &self.protocol)
            .field("headers", &self.headers)
            .field("stream_timeout_ms", &self.stream_timeout_ms)
            .field("max_stream_bytes", &self.max_stream_bytes)
            .field("content_type", &self.content_type)
            .field("error_handler", &self.error_handler.is_some())
            .finish_non_exhaustive()
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads options from `REPLY_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        if let Some(protocol) = lookup("REPLY_PROTOCOL") {
            options.protocol = protocol.trim().to_owned();
        }
        if let Some(ms) = lookup("REPLY_STREAM_TIMEOUT_MS") {
            options.stream_timeout_ms = ms.trim().parse().unwrap_or(DEFAULT_STREAM_TIMEOUT_MS);
        }
        if let Some(bytes) = lookup("REPLY_MAX_STREAM_BYTES") {
            options.max_stream_bytes = bytes.trim().parse().unwrap_or(DEFAULT_MAX_STREAM_BYTES);
        }
        options.content_type = lookup("REPLY_CONTENT_TYPE").filter(|ct| !ct.trim().is_empty());
        options
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn stream_timeout_ms(mut self, ms: u64) -> Self {
        self.stream_timeout_ms = ms;
        self
    }

    pub fn max_stream_bytes(mut self, bytes: u64) -> Self {
        self.max_stream_bytes = bytes;
        self
    }

    /// Forces the content type instead of sniffing it.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Remaps stream source errors. See [`ErrorHandler`].
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&io::Error) -> Option<Error> + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }
}

// ── ResponseConfig ────────────────────────────────────────────────────────────

/// Validated configuration. Both limits are strictly positive and the
/// protocol is one of the known three.
#[derive(Clone)]
pub struct ResponseConfig {
    protocol: Protocol,
    headers: Headers,
    consumer: StreamConsumer,
    content_type: Option<ContentType>,
}

impl ResponseConfig {
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn limits(&self) -> Limits {
        self.consumer.limits()
    }

    pub fn content_type(&self) -> Option<&ContentType> {
        self.content_type.as_ref()
    }

    pub(crate) fn consumer(&self) -> &StreamConsumer {
        &self.consumer
    }
}

impl fmt::Debug for ResponseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseConfig")
            .field("protocol", &self.protocol)
            .field("headers", &self.headers)
            .field("consumer", &self.consumer)
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl TryFrom<Options> for ResponseConfig {
    type Error = Error;

    fn try_from(options: Options) -> Result<Self> {
        let protocol: Protocol = options.protocol.parse()?;

        if options.stream_timeout_ms == 0 {
            return Err(Error::InvalidConfig("stream timeout must be greater than zero".to_owned()));
        }
        if options.max_stream_bytes == 0 {
            return Err(Error::InvalidConfig("max stream bytes must be greater than zero".to_owned()));
        }

        let content_type = options
            .content_type
            .as_deref()
            .map(ContentType::parse)
            .transpose()
            .map_err(|e| Error::InvalidConfig(format!("invalid content type override: {e}")))?;

        let limits = Limits {
            timeout: Duration::from_millis(options.stream_timeout_ms),
            max_bytes: options.max_stream_bytes,
        };
        let mut consumer = StreamConsumer::new(limits)
            .with_diagnostics(options.diagnostics.unwrap_or_else(|| Arc::new(TracingSink)));
        if let Some(handler) = options.error_handler {
            consumer = consumer.with_error_handler(handler);
        }

        Ok(Self { protocol, headers: options.headers, consumer, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = ResponseConfig::try_from(Options::default()).unwrap();
        assert_eq!(config.protocol(), Protocol::RequestResponse);
        assert_eq!(config.limits(), Limits::default());
        assert_eq!(config.limits().max_bytes, 50 * 1024 * 1024);
        assert!(config.headers().is_empty());
        assert!(config.content_type().is_none());
    }

    #[test]
    fn protocol_aliases() {
        assert_eq!("ws".parse::<Protocol>().unwrap(), Protocol::Message);
        assert_eq!("event".parse::<Protocol>().unwrap(), Protocol::Event);
        for p in Protocol::ALL {
            assert_eq!(p.as_str().parse::<Protocol>().unwrap(), p);
        }
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        let err = ResponseConfig::try_from(Options::new().protocol("grpc")).unwrap_err();
        assert!(matches!(err, Error::InvalidProtocol(ref p) if p == "grpc"), "{err:?}");
    }

    #[test]
    fn zero_limits_are_rejected() {
        let err = ResponseConfig::try_from(Options::new().stream_timeout_ms(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        let err = ResponseConfig::try_from(Options::new().max_stream_bytes(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn content_type_override_is_validated() {
        let config = ResponseConfig::try_from(Options::new().content_type("application/json")).unwrap();
        assert_eq!(config.content_type(), Some(&ContentType::Json));

        let err = ResponseConfig::try_from(Options::new().content_type("json")).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn env_lookup_with_fallbacks() {
        let vars: HashMap<&str, &str> = [
            ("REPLY_PROTOCOL", " sse "),
            ("REPLY_STREAM_TIMEOUT_MS", "250"),
            ("REPLY_MAX_STREAM_BYTES", "lots"),
            ("REPLY_CONTENT_TYPE", "text/csv"),
        ]
        .into_iter()
        .collect();
        let options = Options::from_lookup(|k| vars.get(k).map(|v| (*v).to_owned()));

        let config = ResponseConfig::try_from(options).unwrap();
        assert_eq!(config.protocol(), Protocol::Event);
        assert_eq!(config.limits().timeout, Duration::from_millis(250));
        assert_eq!(config.limits().max_bytes, DEFAULT_MAX_STREAM_BYTES);
        assert_eq!(config.content_type(), Some(&ContentType::Custom("text/csv".into())));
    }

    #[test]
    fn empty_env_is_default() {
        let options = Options::from_lookup(|_| None);
        let config = ResponseConfig::try_from(options).unwrap();
        assert_eq!(config.limits(), Limits::default());
    }
}
