//! Body normalization: any plain value to a `(content type, body)` pair.
//!
//! [`normalize`] never fails. Values with no structural encoding (cycles,
//! big integers, foreign values whose serializer failed) degrade to their
//! text rendering under `text/plain`.
//!
//! # Text sniffing
//!
//! Strings are trimmed and tested in this order; the first match wins:
//!
//! | Test | Type |
//! |---|---|
//! | empty | `text/plain` (empty body) |
//! | `{…}` or `[…]` that parses as JSON | `application/json` (parsed body) |
//! | starts with `<?xml` (any case) | `application/xml` |
//! | `<svg …>` … `</svg>` (any case) | `image/svg+xml` |
//! | some line is `<…>` | `text/html` |
//! | one or more `selector { prop: value }` rules | `text/css` |
//! | valid, non-alphanumeric base64 | `application/base64` |
//! | anything else | `text/plain` (trimmed body) |
//!
//! An XML declaration wins over SVG, so `<?xml …?><svg>…</svg>` is XML.

use std::sync::LazyLock;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::Value as Json;
use tracing::debug;

use crate::content_type::ContentType;
use crate::value::{Value, iso_timestamp};

static XML_DECL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^<\?xml").expect("static regex"));
static SVG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)^<svg\b.*</svg>$").expect("static regex"));
static HTML: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^<.+>$").expect("static regex"));
static CSS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[^{}<]+\{\s*[\w-]+\s*:[^{}<>]*\}\s*)+$").expect("static regex")
});

/// A normalized body.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    Empty,
    Text(String),
    Json(Json),
    Binary(Bytes),
}

impl Body {
    /// Wire bytes: text as UTF-8, JSON in compact form, binary as-is.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Text(s) => Bytes::from(s),
            Self::Json(json) => Bytes::from(json.to_string()),
            Self::Binary(b) => b,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Empty => Some(""),
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Json> {
        match self {
            Self::Json(json) => Some(json),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }
}

/// Binary bodies serialize as base64 text.
impl Serialize for Body {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Empty => serializer.serialize_str(""),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Json(json) => json.serialize(serializer),
            Self::Binary(b) => serializer.serialize_str(&STANDARD.encode(b)),
        }
    }
}

/// Feeds a normalized body back in as a value.
impl From<Body> for Value {
    fn from(body: Body) -> Self {
        match body {
            Body::Empty => Value::Text(String::new()),
            Body::Text(s) => Value::Text(s),
            Body::Json(json) => json.into(),
            Body::Binary(b) => Value::Binary(b),
        }
    }
}

/// The canonical `(content type, body)` pair.
#[derive(Clone, Debug, PartialEq)]
pub struct CanonicalBody {
    pub content_type: ContentType,
    pub body: Body,
    error: bool,
}

impl CanonicalBody {
    fn new(content_type: ContentType, body: Body) -> Self {
        Self { content_type, body, error: false }
    }

    fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Self::new(ContentType::Text, Body::Empty)
        } else {
            Self::new(ContentType::Text, Body::Text(s))
        }
    }

    /// Whether the body came from an error-like value.
    pub fn is_error(&self) -> bool {
        self.error
    }
}

/// Maps a value to its canonical body.
///
/// `force_type` skips sniffing entirely: the body is kept as close to the
/// input as possible (text stays unparsed) and labelled with that type.
/// A [`ContentType::Custom`] that is not a valid MIME string is ignored and
/// the value is sniffed as usual.
pub fn normalize(value: Value, force_type: Option<ContentType>) -> CanonicalBody {
    match force_type.and_then(valid_forced) {
        Some(content_type) => {
            let error = matches!(value, Value::Error(_));
            let body = match value {
                Value::Null => Body::Empty,
                Value::Text(s) => Body::Text(s),
                Value::Binary(b) => Body::Binary(b),
                other => classify(other).body,
            };
            CanonicalBody { content_type, body, error }
        }
        None => classify(value),
    }
}

fn valid_forced(content_type: ContentType) -> Option<ContentType> {
    let ContentType::Custom(raw) = content_type else {
        return Some(content_type);
    };
    match ContentType::parse(&raw) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            debug!(content_type = %raw, error = %err, "ignoring invalid forced content type");
            None
        }
    }
}

fn classify(value: Value) -> CanonicalBody {
    match value {
        Value::Null => CanonicalBody::text(""),
        Value::Text(s) => sniff(&s),
        Value::Bool(_)
        | Value::Int(_)
        | Value::UInt(_)
        | Value::Float(_)
        | Value::BigInt(_)
        | Value::Symbol(_)
        | Value::Function(_) => CanonicalBody::text(value.to_string()),
        Value::Error(e) => CanonicalBody {
            content_type: ContentType::Json,
            body: Body::Json(e.to_json()),
            error: true,
        },
        Value::Date(ts) => CanonicalBody::new(ContentType::Json, Body::Json(Json::String(iso_timestamp(ts)))),
        Value::Binary(b) => CanonicalBody::new(ContentType::OctetStream, Body::Binary(b)),
        Value::Regex(src) => CanonicalBody::text(src),
        Value::Unserializable(text) => CanonicalBody::text(text),
        Value::Shared(shared) => {
            let inner = shared.get();
            if inner.is_container() {
                structural(Value::Shared(shared))
            } else {
                classify(inner)
            }
        }
        Value::Array(_) | Value::Map(_) | Value::Set(_) | Value::Object(_) => structural(value),
    }
}

fn structural(value: Value) -> CanonicalBody {
    match value.to_json() {
        Ok(json) => CanonicalBody::new(ContentType::Json, Body::Json(json)),
        Err(err) => {
            debug!(error = %err, "structural encoding failed, falling back to text");
            CanonicalBody::text(value.to_string())
        }
    }
}

/// Content sniffing for string input. See the module docs for the order.
pub fn sniff(input: &str) -> CanonicalBody {
    let s = input.trim();
    if s.is_empty() {
        return CanonicalBody::text("");
    }

    let bracketed = (s.starts_with('{') && s.ends_with('}')) || (s.starts_with('[') && s.ends_with(']'));
    if bracketed {
        if let Ok(json) = serde_json::from_str::<Json>(s) {
            return CanonicalBody::new(ContentType::Json, Body::Json(json));
        }
    }

    let content_type = if XML_DECL.is_match(s) {
        ContentType::Xml
    } else if SVG.is_match(s) {
        ContentType::Svg
    } else if HTML.is_match(s) {
        ContentType::Html
    } else if CSS.is_match(s) {
        ContentType::Css
    } else if is_base64(s) {
        ContentType::Base64
    } else {
        return CanonicalBody::text(s);
    };
    CanonicalBody::new(content_type, Body::Text(input.to_owned()))
}

/// Strict base64 check.
///
/// The string must be at least 4 characters, a multiple of 4 long, decode
/// to at least one byte, and re-encode to exactly itself. Purely
/// alphanumeric strings are rejected so ordinary words (`"test"`) stay text.
pub fn is_base64(s: &str) -> bool {
    if s.len() < 4 || s.len() % 4 != 0 {
        return false;
    }
    if s.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return false;
    }
    match STANDARD.decode(s) {
        Ok(decoded) if !decoded.is_empty() => STANDARD.encode(&decoded) == s,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ErrorValue, Shared};
    use serde_json::json;

    fn ct(v: impl Into<Value>) -> ContentType {
        normalize(v.into(), None).content_type
    }

    #[test]
    fn null_is_empty_text() {
        let c = normalize(Value::Null, None);
        assert_eq!(c.content_type, ContentType::Text);
        assert_eq!(c.body, Body::Empty);
    }

    #[test]
    fn forced_type_skips_sniffing() {
        let c = normalize(r#"{"a":1}"#.into(), Some(ContentType::Text));
        assert_eq!(c.content_type, ContentType::Text);
        assert_eq!(c.body, Body::Text(r#"{"a":1}"#.to_owned()));

        let c = normalize(Value::Int(5), Some(ContentType::Custom("x/y".into())));
        assert_eq!(c.body, Body::Text("5".to_owned()));
    }

    #[test]
    fn invalid_custom_forced_type_is_ignored() {
        let c = normalize(r#"{"a":1}"#.into(), Some(ContentType::Custom("not a mime".into())));
        assert_eq!(c.content_type, ContentType::Json);
        assert_eq!(c.body, Body::Json(json!({ "a": 1 })));

        let c = normalize("x".into(), Some(ContentType::Custom("text/css".into())));
        assert_eq!(c.content_type, ContentType::Css);
    }

    #[test]
    fn unsigned_json_numbers_stay_json() {
        let once = normalize(r#"{"id":18446744073709551615}"#.into(), None);
        assert_eq!(once.content_type, ContentType::Json);
        assert_eq!(once.body, Body::Json(json!({ "id": u64::MAX })));

        let twice = normalize(once.body.clone().into(), None);
        assert_eq!(twice, once);

        let c = normalize(json!({ "n": 9_999_999_999_999_999_999u64 }).into(), None);
        assert_eq!(c.content_type, ContentType::Json);
    }

    #[test]
    fn scalars_are_plain_text() {
        assert_eq!(normalize(Value::Int(42), None).body, Body::Text("42".into()));
        assert_eq!(normalize(true.into(), None).body, Body::Text("true".into()));
        assert_eq!(normalize(Value::BigInt(10), None).body, Body::Text("10".into()));
        assert_eq!(ct(Value::Function("fn main() {}".into())), ContentType::Text);
    }

    #[test]
    fn json_strings_are_parsed() {
        let c = normalize("  {\"a\": [1, 2]}  ".into(), None);
        assert_eq!(c.content_type, ContentType::Json);
        assert_eq!(c.body, Body::Json(json!({ "a": [1, 2] })));
    }

    #[test]
    fn broken_json_falls_through() {
        let c = normalize("{not json}".into(), None);
        assert_eq!(c.content_type, ContentType::Text);
        assert_eq!(c.body, Body::Text("{not json}".into()));
    }

    #[test]
    fn markup_is_detected() {
        assert_eq!(ct("<?XML version=\"1.0\"?><a/>"), ContentType::Xml);
        assert_eq!(ct("<?xml version=\"1.0\"?><svg></svg>"), ContentType::Xml);
        assert_eq!(ct("<svg width=\"1\"><rect/></svg>"), ContentType::Svg);
        assert_eq!(ct("<div>hi</div>"), ContentType::Html);
        assert_eq!(ct("intro\n<p>para</p>"), ContentType::Html);
        assert_eq!(ct("<svgfoo>x</svgfoo>"), ContentType::Html);
    }

    #[test]
    fn markup_body_is_unchanged() {
        let c = normalize("  <b>x</b>\n".into(), None);
        assert_eq!(c.body, Body::Text("  <b>x</b>\n".into()));
    }

    #[test]
    fn css_is_detected() {
        assert_eq!(ct("body { color: red; }"), ContentType::Css);
        assert_eq!(ct(".a{margin:0} #b > p { padding: 1px }"), ContentType::Css);
        assert_eq!(ct("plain words"), ContentType::Text);
    }

    #[test]
    fn base64_needs_exact_round_trip() {
        assert!(is_base64("dGVzdA=="));
        assert!(!is_base64("test"));
        assert!(!is_base64("abcd1234"));
        assert!(!is_base64("dGVzdA="));
        assert!(!is_base64("===="));
        assert_eq!(ct("dGVzdA=="), ContentType::Base64);
        assert_eq!(ct("test"), ContentType::Text);
    }

    #[test]
    fn plain_text_is_trimmed() {
        let c = normalize("  hello world \n".into(), None);
        assert_eq!(c.body, Body::Text("hello world".into()));
    }

    #[test]
    fn errors_become_json_objects() {
        let c = normalize(ErrorValue::new("Error", "boom").with_extra("code", 7).into(), None);
        assert!(c.is_error());
        assert_eq!(c.content_type, ContentType::Json);
        let body = c.body.as_json().unwrap();
        assert_eq!(body["message"], "boom");
        assert_eq!(body["code"], 7);
    }

    #[test]
    fn dates_become_iso_strings() {
        let ts: jiff::Timestamp = "2024-01-02T03:04:05.678Z".parse().unwrap();
        let c = normalize(ts.into(), None);
        assert_eq!(c.content_type, ContentType::Json);
        assert_eq!(c.body, Body::Json(json!("2024-01-02T03:04:05.678Z")));
    }

    #[test]
    fn collections() {
        let bytes = Bytes::from_static(b"\x00\x01");
        assert_eq!(normalize(bytes.clone().into(), None).body, Body::Binary(bytes));
        assert_eq!(
            normalize(Value::map([("k", 1)]), None).body,
            Body::Json(json!([["k", 1]]))
        );
        assert_eq!(normalize(Value::set(["a", "b"]), None).body, Body::Json(json!(["a", "b"])));
        assert_eq!(normalize(Value::Regex("^a+$".into()), None).body, Body::Text("^a+$".into()));
    }

    #[test]
    fn cyclic_objects_fall_back_to_text() {
        let node = Shared::new(Value::Null);
        node.set(Value::object([("self", Value::Shared(node.clone()))]));
        let c = normalize(Value::Shared(node), None);
        assert_eq!(c.content_type, ContentType::Text);
        assert_eq!(c.body, Body::Text("{ self: [Circular] }".into()));
    }

    #[test]
    fn stringified_structures_round_trip() {
        let x = json!({ "id": 1, "tags": ["a", "b"], "nested": { "ok": true } });
        let c = normalize(x.to_string().into(), None);
        assert_eq!(c.content_type, ContentType::Json);
        assert_eq!(c.body, Body::Json(x));
    }

    #[test]
    fn normalizing_twice_is_a_no_op() {
        let inputs = [
            Value::Binary(Bytes::from_static(b"raw")),
            Value::array([1, 2, 3]),
            Value::object([("a", "b")]),
        ];
        for input in inputs {
            let once = normalize(input, None);
            let twice = normalize(once.body.clone().into(), None);
            assert_eq!(once, twice);
        }
    }
}
