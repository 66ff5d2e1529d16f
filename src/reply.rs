//! Handler results and the [`IntoReply`] conversion trait.
//!
//! A handler produces a [`Reply`]: either a [`Payload`] or an [`Error`],
//! plus any response headers middlewares attached on the way out. The core
//! dispatch decides once, per request, how the payload reaches the wire:
//!
//! | Payload              | Written by                            |
//! |----------------------|---------------------------------------|
//! | `Payload::Empty`     | nobody: `204 No Content`, empty body  |
//! | `Payload::Value(_)`  | the route's [`Encoder`](crate::Encoder) |
//! | `Payload::Custom(_)` | the payload itself ([`WriteResponse`]) |

use std::fmt;
use std::io;

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::Serialize;

use crate::error::Error;
use crate::writer::{ResponseWriter, WriteResponse};

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`Payload::bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Csv,          // text/csv
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

// ── Payload ───────────────────────────────────────────────────────────────────

/// The success half of a handler result.
pub enum Payload {
    /// No content. Answered with `204` and an empty body.
    Empty,
    /// A structured value for the route's encoder.
    Value(serde_json::Value),
    /// A value that writes its own status, headers and body.
    Custom(Box<dyn WriteResponse>),
}

impl Payload {
    /// Serialises `value` for the route's encoder.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        serde_json::to_value(value).map(Self::Value).map_err(Error::other)
    }

    /// Raw bytes with an explicit content type, bypassing the encoder.
    pub fn bytes(content_type: ContentType, body: impl Into<Vec<u8>>) -> Self {
        Self::custom(Raw { status: StatusCode::OK, content_type, body: body.into() })
    }

    /// Plain text (`text/plain; charset=utf-8`), bypassing the encoder.
    pub fn text(body: impl Into<String>) -> Self {
        Self::bytes(ContentType::Text, body.into())
    }

    pub fn custom(response: impl WriteResponse + 'static) -> Self {
        Self::Custom(Box::new(response))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self { Self::Empty }
}

impl From<&'static str> for Payload {
    fn from(s: &'static str) -> Self { Self::Value(s.into()) }
}

impl From<String> for Payload {
    fn from(s: String) -> Self { Self::Value(s.into()) }
}

impl From<serde_json::Value> for Payload {
    fn from(v: serde_json::Value) -> Self { Self::Value(v) }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Empty, Into::into)
    }
}

/// Bytes with a fixed status and content type.
struct Raw {
    status: StatusCode,
    content_type: ContentType,
    body: Vec<u8>,
}

impl WriteResponse for Raw {
    fn write_to(&self, w: &mut dyn ResponseWriter) -> io::Result<()> {
        w.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(self.content_type.as_str()));
        w.set_status(self.status);
        w.write(&self.body)?;
        Ok(())
    }
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// A handler result plus the response headers collected for it.
#[derive(Debug)]
pub struct Reply {
    headers: HeaderMap,
    result: Result<Payload, Error>,
}

impl Reply {
    pub fn new(result: Result<Payload, Error>) -> Self {
        Self { headers: HeaderMap::new(), result }
    }

    pub fn ok(payload: impl Into<Payload>) -> Self {
        Self::new(Ok(payload.into()))
    }

    pub fn empty() -> Self {
        Self::new(Ok(Payload::Empty))
    }

    pub fn err(error: impl Into<Error>) -> Self {
        Self::new(Err(error.into()))
    }

    /// Headers copied onto the response before it is encoded.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn result(&self) -> &Result<Payload, Error> {
        &self.result
    }

    pub fn error(&self) -> Option<&Error> {
        self.result.as_ref().err()
    }

    pub fn into_parts(self) -> (HeaderMap, Result<Payload, Error>) {
        (self.headers, self.result)
    }
}

impl From<Error> for Reply {
    fn from(e: Error) -> Self {
        Self::err(e)
    }
}

// ── IntoReply ─────────────────────────────────────────────────────────────────

/// Conversion from a handler's return value into a [`Reply`].
///
/// Handlers usually return `Result<P, E>` where `P: Into<Payload>` and
/// `E: Into<Error>`:
///
/// ```rust
/// use switchyard::{Error, HttpError, Payload, Request};
///
/// async fn get_user(req: Request) -> Result<Payload, Error> {
///     match req.param("id") {
///         Some("1") => Payload::json(&serde_json::json!({ "id": 1, "name": "alice" })),
///         _ => Err(HttpError::not_found("no such user").into()),
///     }
/// }
/// ```
pub trait IntoReply {
    fn into_reply(self) -> Reply;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Reply { self }
}

impl IntoReply for Payload {
    fn into_reply(self) -> Reply { Reply::ok(self) }
}

impl IntoReply for () {
    fn into_reply(self) -> Reply { Reply::empty() }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Reply { Reply::ok(self) }
}

impl IntoReply for String {
    fn into_reply(self) -> Reply { Reply::ok(self) }
}

impl IntoReply for serde_json::Value {
    fn into_reply(self) -> Reply { Reply::ok(self) }
}

impl IntoReply for Error {
    fn into_reply(self) -> Reply { Reply::err(self) }
}

impl<P, E> IntoReply for Result<P, E>
where
    P: Into<Payload>,
    E: Into<Error>,
{
    fn into_reply(self) -> Reply {
        Reply::new(self.map(Into::into).map_err(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Transport;

    #[test]
    fn none_is_empty() {
        let p: Payload = None::<String>.into();
        assert!(p.is_empty());
        let p: Payload = Some("OK").into();
        assert!(matches!(p, Payload::Value(serde_json::Value::String(ref s)) if s == "OK"));
    }

    #[test]
    fn text_payload_writes_itself() {
        let Payload::Custom(text) = Payload::text("ready") else { panic!("expected custom") };
        let mut t = Transport::new();
        text.write_to(&mut t).unwrap();

        assert_eq!(t.status(), Some(StatusCode::OK));
        assert_eq!(t.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(t.body(), b"ready");
    }

    #[test]
    fn result_into_reply() {
        let reply = Err::<(), _>(Error::Timeout).into_reply();
        assert!(reply.error().is_some_and(Error::is_timeout));
    }
}
