//! Protocol envelopes: the shapes handed to the transport.
//!
//! Field names are part of the wire contract:
//!
//! | Protocol | JSON shape |
//! |---|---|
//! | request-response | `{ statusCode, headers: { "Content-Type", … }, body, size? }` |
//! | message | `{ statusCode, body, type, timestamp, size? }` |
//! | event | `{ statusCode, message, type, timestamp, size? }` |
//!
//! `size` is present only when the body was buffered from a stream.

use bytes::Bytes;
use http_body_util::Full;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::config::Protocol;
use crate::content_type::ContentType;
use crate::error::Result;
use crate::normalize::Body;

// ── Headers ───────────────────────────────────────────────────────────────────

/// Ordered header list. Names compare case-insensitively; inserting an
/// existing name replaces its value in place.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Inserts every entry of `other`, later values winning.
    pub fn merge(&mut self, other: &Headers) {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ── Envelopes ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpEnvelope {
    pub status_code: u16,
    pub headers: Headers,
    pub body: Body,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub status_code: u16,
    pub body: Body,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub status_code: u16,
    pub message: Body,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A finished response in one of the three protocol shapes.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    RequestResponse(HttpEnvelope),
    Message(MessageEnvelope),
    Event(EventEnvelope),
}

/// The canonical triple plus status, before shaping.
pub(crate) struct Parts {
    pub status: u16,
    pub content_type: ContentType,
    pub body: Body,
    pub size: Option<u64>,
}

impl Envelope {
    pub(crate) fn build(protocol: Protocol, parts: Parts, headers: &Headers, timestamp: String) -> Self {
        let Parts { status, content_type, body, size } = parts;
        match protocol {
            Protocol::RequestResponse => {
                let mut all = Headers::new();
                all.insert("Content-Type", content_type.as_str());
                all.merge(headers);
                Self::RequestResponse(HttpEnvelope { status_code: status, headers: all, body, size })
            }
            Protocol::Message => Self::Message(MessageEnvelope {
                status_code: status,
                body,
                content_type,
                timestamp,
                size,
            }),
            Protocol::Event => Self::Event(EventEnvelope {
                status_code: status,
                message: body,
                content_type,
                timestamp,
                size,
            }),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Self::RequestResponse(_) => Protocol::RequestResponse,
            Self::Message(_) => Protocol::Message,
            Self::Event(_) => Protocol::Event,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::RequestResponse(e) => e.status_code,
            Self::Message(e) => e.status_code,
            Self::Event(e) => e.status_code,
        }
    }

    /// The `body` field, or `message` for events.
    pub fn body(&self) -> &Body {
        match self {
            Self::RequestResponse(e) => &e.body,
            Self::Message(e) => &e.body,
            Self::Event(e) => &e.message,
        }
    }

    /// The content-type signal: the `Content-Type` header or `type` field.
    pub fn content_type(&self) -> &str {
        match self {
            Self::RequestResponse(e) => e.headers.get("content-type").unwrap_or_default(),
            Self::Message(e) => e.content_type.as_str(),
            Self::Event(e) => e.content_type.as_str(),
        }
    }

    pub fn size(&self) -> Option<u64> {
        match self {
            Self::RequestResponse(e) => e.size,
            Self::Message(e) => e.size,
            Self::Event(e) => e.size,
        }
    }

    /// Converts into an HTTP response.
    ///
    /// Request-response envelopes map field for field; message and event
    /// envelopes are sent as their JSON encoding.
    pub fn into_http(self) -> Result<http::Response<Full<Bytes>>> {
        let status = self.status_code();
        let response = match self {
            Self::RequestResponse(e) => {
                let mut builder = http::Response::builder().status(status);
                for (name, value) in e.headers.iter() {
                    builder = builder.header(name, value);
                }
                builder.body(Full::new(e.body.into_bytes()))?
            }
            other => {
                let json = serde_json::to_vec(&other)?;
                http::Response::builder()
                    .status(status)
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Full::new(Bytes::from(json)))?
            }
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parts(size: Option<u64>) -> Parts {
        Parts {
            status: 201,
            content_type: ContentType::Json,
            body: Body::Json(json!({ "id": 1 })),
            size,
        }
    }

    const TS: &str = "2024-01-01T00:00:00.000Z";

    #[test]
    fn headers_replace_case_insensitively() {
        let mut h: Headers = [("X-A", "1"), ("x-b", "2")].into_iter().collect();
        h.insert("x-a", "3");
        assert_eq!(h.len(), 2);
        assert_eq!(h.get("X-A"), Some("3"));
        assert_eq!(h.iter().next(), Some(("X-A", "3")));
    }

    #[test]
    fn request_response_shape() {
        let configured: Headers = [("x-trace", "abc")].into_iter().collect();
        let env = Envelope::build(Protocol::RequestResponse, parts(None), &configured, TS.into());
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({
                "statusCode": 201,
                "headers": { "Content-Type": "application/json", "x-trace": "abc" },
                "body": { "id": 1 },
            })
        );
    }

    #[test]
    fn configured_content_type_header_wins() {
        let configured: Headers = [("content-type", "application/vnd.api+json")].into_iter().collect();
        let env = Envelope::build(Protocol::RequestResponse, parts(None), &configured, TS.into());
        assert_eq!(env.content_type(), "application/vnd.api+json");
    }

    #[test]
    fn message_and_event_shapes() {
        let message = Envelope::build(Protocol::Message, parts(Some(8)), &Headers::new(), TS.into());
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "statusCode": 201,
                "body": { "id": 1 },
                "type": "application/json",
                "timestamp": TS,
                "size": 8,
            })
        );

        let event = Envelope::build(Protocol::Event, parts(None), &Headers::new(), TS.into());
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "statusCode": 201,
                "message": { "id": 1 },
                "type": "application/json",
                "timestamp": TS,
            })
        );
        assert_eq!(event.protocol(), Protocol::Event);
    }

    #[test]
    fn binary_bodies_serialize_as_base64() {
        let p = Parts {
            status: 200,
            content_type: ContentType::OctetStream,
            body: Body::Binary(Bytes::from_static(b"abc")),
            size: Some(3),
        };
        let env = Envelope::build(Protocol::Message, p, &Headers::new(), TS.into());
        assert_eq!(serde_json::to_value(&env).unwrap()["body"], "YWJj");
    }

    #[test]
    fn into_http_request_response() {
        let env = Envelope::build(Protocol::RequestResponse, parts(Some(8)), &Headers::new(), TS.into());
        let res = env.into_http().unwrap();
        assert_eq!(res.status(), http::StatusCode::CREATED);
        assert_eq!(res.headers()["content-type"], "application/json");
    }

    #[test]
    fn into_http_rejects_bad_header_names() {
        let configured: Headers = [("bad header", "x")].into_iter().collect();
        let env = Envelope::build(Protocol::RequestResponse, parts(None), &configured, TS.into());
        assert!(env.into_http().is_err());
    }
}
