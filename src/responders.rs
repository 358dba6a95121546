//! One-call responders: a status name crossed with a protocol.
//!
//! ```rust
//! use reply::{Options, Responders};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), reply::Error> {
//! let sse = Responders::new(Options::new().protocol("sse"));
//! let envelope = sse.not_found("no such user").await?;
//! assert_eq!(envelope.status_code(), 404);
//! # Ok(())
//! # }
//! ```

use crate::config::{Options, Protocol};
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::response::{Payload, Responder};
use crate::status::Status;

/// Builds a fresh [`Responder`] per call from shared options.
#[derive(Clone, Debug, Default)]
pub struct Responders {
    options: Options,
}

impl Responders {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    /// Default options for `protocol`.
    pub fn for_protocol(protocol: Protocol) -> Self {
        Self::new(Options::new().protocol(protocol.as_str()))
    }

    /// Sends `payload` with `status`.
    pub async fn send(&self, status: Status, payload: impl Into<Payload>) -> Result<Envelope> {
        Responder::new(self.options.clone())?.status(status)?.send(payload).await
    }
}

macro_rules! status_methods {
    ($($method:ident => $status:ident),* $(,)?) => {
        impl Responders {
            $(
                #[doc = concat!("Sends `payload` with [`Status::", stringify!($status), "`].")]
                pub async fn $method(&self, payload: impl Into<Payload>) -> Result<Envelope> {
                    self.send(Status::$status, payload).await
                }
            )*
        }
    };
}

status_methods! {
    ok                    => Ok,
    created               => Created,
    accepted              => Accepted,
    no_content            => NoContent,
    bad_request           => BadRequest,
    unauthorized          => Unauthorized,
    forbidden             => Forbidden,
    not_found             => NotFound,
    method_not_allowed    => MethodNotAllowed,
    conflict              => Conflict,
    unprocessable_entity  => UnprocessableEntity,
    too_many_requests     => TooManyRequests,
    internal_server_error => InternalServerError,
    not_implemented       => NotImplemented,
    bad_gateway           => BadGateway,
    service_unavailable   => ServiceUnavailable,
    gateway_timeout       => GatewayTimeout,
}

/// Two-level lookup: protocol identifier, then status name (`"notFound"`).
///
/// `options` supplies everything else; its protocol is replaced.
pub fn responder(protocol: &str, status: &str, options: Options) -> Result<Responder> {
    let protocol: Protocol = protocol.parse()?;
    let status = Status::from_name(status)
        .ok_or_else(|| Error::InvalidConfig(format!("unknown status name {status:?}")))?;
    Responder::new(options.protocol(protocol.as_str()))?.status(status)
}
