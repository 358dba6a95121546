//! Unified error type.

use std::io;

use thiserror::Error;

use crate::config::Protocol;

/// Coarse status family inferred for a failed stream source.
///
/// Attached to [`Error::Source`] so a caller can pick a transport status
/// without string-matching the message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusClass {
    /// The source refers to a resource that does not exist.
    NotFound,
    /// The source exists but may not be read.
    Forbidden,
    /// Anything else.
    ServerError,
}

impl StatusClass {
    /// Classifies an I/O failure by its kind.
    pub fn of(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound         => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::Forbidden,
            _                               => Self::ServerError,
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Self::NotFound    => 404,
            Self::Forbidden   => 403,
            Self::ServerError => 500,
        }
    }
}

/// The error type returned by reply's fallible operations.
///
/// Normalizing a plain value never fails. Errors come from configuration
/// (protocol, limits, status), from consuming a stream, or from whatever
/// an [`ErrorHandler`](crate::ErrorHandler) substitutes for a source failure.
#[derive(Debug, Error)]
pub enum Error {
    /// The stream did not finish within the configured wait.
    #[error("stream timed out after {timeout_ms}ms")]
    StreamTimeout { timeout_ms: u64 },

    /// The stream delivered more bytes than allowed.
    #[error("stream exceeded size limit of {limit} bytes ({actual} bytes received)")]
    StreamSizeLimit { limit: u64, actual: u64 },

    /// A status outside `100..=599`.
    #[error("invalid status code: {0}")]
    InvalidStatus(i64),

    /// An unrecognized protocol identifier.
    #[error("invalid protocol: {0:?}")]
    InvalidProtocol(String),

    /// A limit or override rejected at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The underlying byte source failed.
    #[error("stream source error: {source}")]
    Source {
        #[source]
        source: io::Error,
        class: StatusClass,
    },

    /// A replacement produced by an error handler.
    #[error("{message}")]
    Custom {
        status: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    /// An envelope could not be turned into an HTTP response.
    #[error("http: {0}")]
    Http(#[from] http::Error),

    /// An envelope could not be encoded.
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),

    /// A failure raised from `send`, tagged with where it happened.
    #[error("{source} (protocol: {protocol}, status: {status})")]
    Send {
        protocol: Protocol,
        status: u16,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Shorthand for an [`Error::Custom`] without a cause.
    pub fn custom(status: impl Into<u16>, message: impl Into<String>) -> Self {
        Self::Custom { status: status.into(), message: message.into(), source: None }
    }

    /// The status a transport should answer with for this failure.
    pub fn status(&self) -> u16 {
        match self {
            Self::StreamTimeout { .. }   => 504,
            Self::StreamSizeLimit { .. } => 413,
            Self::InvalidStatus(_)
            | Self::InvalidProtocol(_)
            | Self::InvalidConfig(_)
            | Self::Http(_)
            | Self::Encode(_)            => 500,
            Self::Source { class, .. }   => class.code(),
            Self::Custom { status, .. }  => *status,
            Self::Send { source, .. }    => source.status(),
        }
    }

    /// Kinds that already describe themselves and pass through `send`
    /// without annotation.
    pub(crate) fn is_self_describing(&self) -> bool {
        matches!(
            self,
            Self::StreamTimeout { .. } | Self::StreamSizeLimit { .. } | Self::InvalidStatus(_)
        )
    }

    /// Strips any `send` annotation.
    pub fn root(&self) -> &Error {
        match self {
            Self::Send { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
