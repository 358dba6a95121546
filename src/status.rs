//! Named status codes.
//!
//! [`Status`] is the fixed table the responder layer is generated from.
//! Anywhere a status is accepted you can pass either a [`Status`] or a raw
//! `u16`; raw codes are validated against `100..=599` when set.
//!
//! ```rust
//! use reply::{Options, Responder, Status};
//!
//! # fn main() -> Result<(), reply::Error> {
//! let responder = Responder::new(Options::default())?.status(Status::Created)?;
//! # let _ = responder;
//! # Ok(())
//! # }
//! ```

use std::fmt;

/// The status names known to the responder layer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Status {
    // ── 2xx Success ───────────────────────────────────────────────────────────
    Ok,                  // 200
    Created,             // 201
    Accepted,            // 202
    NoContent,           // 204

    // ── 4xx Client errors ─────────────────────────────────────────────────────
    BadRequest,          // 400
    Unauthorized,        // 401
    Forbidden,           // 403
    NotFound,            // 404
    MethodNotAllowed,    // 405
    Conflict,            // 409
    UnprocessableEntity, // 422
    TooManyRequests,     // 429

    // ── 5xx Server errors ─────────────────────────────────────────────────────
    InternalServerError, // 500
    NotImplemented,      // 501
    BadGateway,          // 502
    ServiceUnavailable,  // 503
    GatewayTimeout,      // 504
}

impl Status {
    /// Every named status, in table order.
    pub const ALL: [Status; 17] = [
        Self::Ok,
        Self::Created,
        Self::Accepted,
        Self::NoContent,
        Self::BadRequest,
        Self::Unauthorized,
        Self::Forbidden,
        Self::NotFound,
        Self::MethodNotAllowed,
        Self::Conflict,
        Self::UnprocessableEntity,
        Self::TooManyRequests,
        Self::InternalServerError,
        Self::NotImplemented,
        Self::BadGateway,
        Self::ServiceUnavailable,
        Self::GatewayTimeout,
    ];

    /// Numeric code.
    pub fn code(self) -> u16 {
        match self {
            Self::Ok                  => 200,
            Self::Created             => 201,
            Self::Accepted            => 202,
            Self::NoContent           => 204,
            Self::BadRequest          => 400,
            Self::Unauthorized        => 401,
            Self::Forbidden           => 403,
            Self::NotFound            => 404,
            Self::MethodNotAllowed    => 405,
            Self::Conflict            => 409,
            Self::UnprocessableEntity => 422,
            Self::TooManyRequests     => 429,
            Self::InternalServerError => 500,
            Self::NotImplemented      => 501,
            Self::BadGateway          => 502,
            Self::ServiceUnavailable  => 503,
            Self::GatewayTimeout      => 504,
        }
    }

    /// The camel-case name used by the responder lookup (e.g. `"notFound"`).
    pub fn name(self) -> &'static str {
        match self {
            Self::Ok                  => "ok",
            Self::Created             => "created",
            Self::Accepted            => "accepted",
            Self::NoContent           => "noContent",
            Self::BadRequest          => "badRequest",
            Self::Unauthorized        => "unauthorized",
            Self::Forbidden           => "forbidden",
            Self::NotFound            => "notFound",
            Self::MethodNotAllowed    => "methodNotAllowed",
            Self::Conflict            => "conflict",
            Self::UnprocessableEntity => "unprocessableEntity",
            Self::TooManyRequests     => "tooManyRequests",
            Self::InternalServerError => "internalServerError",
            Self::NotImplemented      => "notImplemented",
            Self::BadGateway          => "badGateway",
            Self::ServiceUnavailable  => "serviceUnavailable",
            Self::GatewayTimeout      => "gatewayTimeout",
        }
    }

    /// Looks a status up by its table name. Case-sensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Looks a status up by numeric code.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        s.code()
    }
}

impl From<Status> for i64 {
    fn from(s: Status) -> i64 {
        s.code().into()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_codes_are_unique() {
        for (i, a) in Status::ALL.iter().enumerate() {
            for b in &Status::ALL[i + 1..] {
                assert_ne!(a.code(), b.code());
                assert_ne!(a.name(), b.name());
            }
        }
    }

    #[test]
    fn lookup_by_name_and_code() {
        assert_eq!(Status::from_name("notFound"), Some(Status::NotFound));
        assert_eq!(Status::from_name("NotFound"), None);
        assert_eq!(Status::from_code(429), Some(Status::TooManyRequests));
        assert_eq!(Status::from_code(418), None);
        assert_eq!(u16::from(Status::GatewayTimeout), 504);
    }
}
