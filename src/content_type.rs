//! Content-type values produced by normalization and stream consumption.

use std::fmt;

use serde::{Serialize, Serializer};

/// The content type of a canonical body.
///
/// Sniffing and stream classification only ever yield the named variants.
/// [`ContentType::Custom`] carries a caller-supplied override.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ContentType {
    Base64,      // application/base64
    Css,         // text/css
    Gzip,        // application/gzip     (compression-family streams)
    Html,        // text/html
    Json,        // application/json
    OctetStream, // application/octet-stream
    Stream,      // application/x-stream (generic emitter streams)
    Svg,         // image/svg+xml
    Text,        // text/plain
    Xml,         // application/xml
    Custom(String),
}

impl ContentType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Base64      => "application/base64",
            Self::Css         => "text/css",
            Self::Gzip        => "application/gzip",
            Self::Html        => "text/html",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Stream      => "application/x-stream",
            Self::Svg         => "image/svg+xml",
            Self::Text        => "text/plain",
            Self::Xml         => "application/xml",
            Self::Custom(s)   => s,
        }
    }

    /// Parses and validates an override, mapping well-known values back to
    /// their named variant.
    pub fn parse(s: &str) -> Result<Self, mime::FromStrError> {
        let parsed: mime::Mime = s.trim().parse()?;
        let essence = parsed.essence_str();
        let known = [
            Self::Base64,
            Self::Css,
            Self::Gzip,
            Self::Html,
            Self::Json,
            Self::OctetStream,
            Self::Stream,
            Self::Svg,
            Self::Text,
            Self::Xml,
        ];
        // Parameters (e.g. `; charset=utf-8`) keep the value custom.
        if parsed.params().next().is_none() {
            if let Some(named) = known.into_iter().find(|k| k.as_str() == essence) {
                return Ok(named);
            }
        }
        Ok(Self::Custom(parsed.to_string()))
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ContentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
