//! Pluggable boundaries around the pipeline: decoding requests, encoding
//! payloads and turning errors into responses.

use std::io;

use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::error::{Error, Result};
use crate::request::RawRequest;
use crate::writer::ResponseWriter;

const FORM: &str = "application/x-www-form-urlencoded";
const JSON: &str = "application/json";

fn content_type_is(req: &RawRequest, expected: &str) -> bool {
    req.header(CONTENT_TYPE.as_str())
        .and_then(|v| v.split(';').next())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case(expected))
}

// ── Decoder ───────────────────────────────────────────────────────────────────

/// Converts an inbound request into a structured value that
/// [`Request::decode`](crate::Request::decode) deserialises into the
/// caller's type. Errors are propagated to the handler verbatim.
pub trait Decoder: Send + Sync + 'static {
    fn decode(&self, req: &RawRequest) -> Result<Value>;
}

/// Default decoder: form fields first, then a JSON body on top.
///
/// Query string pairs, an urlencoded body and path parameters are merged
/// into one object, path parameters winning. If the request carries a
/// non-empty `application/json` body its fields overlay the form fields.
/// Form-derived values are strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormDecoder;

impl Decoder for FormDecoder {
    fn decode(&self, req: &RawRequest) -> Result<Value> {
        let mut fields = Map::new();
        let mut add_pairs = |input: &[u8]| {
            for (k, v) in form_urlencoded::parse(input) {
                fields.insert(k.into_owned(), Value::String(v.into_owned()));
            }
        };

        if let Some(query) = req.uri().query() {
            add_pairs(query.as_bytes());
        }
        if content_type_is(req, FORM) {
            add_pairs(req.body());
        }
        for (k, v) in req.params() {
            fields.insert(k.clone(), Value::String(v.clone()));
        }

        if content_type_is(req, JSON) && !req.body().is_empty() {
            match serde_json::from_slice(req.body()).map_err(Error::decode)? {
                Value::Object(body) => fields.extend(body),
                other if fields.is_empty() => return Ok(other),
                _ => return Err(Error::decode("expected a JSON object body")),
            }
        }

        Ok(Value::Object(fields))
    }
}

// ── Encoder ───────────────────────────────────────────────────────────────────

/// Writes a success payload into the response.
///
/// Never called for empty payloads; those become `204 No Content`.
pub trait Encoder: Send + Sync + 'static {
    fn encode(&self, w: &mut dyn ResponseWriter, payload: &Value) -> Result<()>;
}

/// Default encoder: the payload as JSON, `content-type: application/json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn encode(&self, w: &mut dyn ResponseWriter, payload: &Value) -> Result<()> {
        let body = serde_json::to_vec(payload).map_err(Error::other)?;
        w.headers_mut()
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(JSON));
        w.write(&body)?;
        Ok(())
    }
}

// ── ErrorHandler ──────────────────────────────────────────────────────────────

/// Decides status and body for a failed request.
///
/// Called at most once per request. If it fails to write, the failure is
/// logged by the caller and goes no further.
pub trait ErrorHandler: Send + Sync + 'static {
    fn handle(&self, w: &mut dyn ResponseWriter, err: &Error) -> io::Result<()>;
}

impl<F> ErrorHandler for F
where
    F: Fn(&mut dyn ResponseWriter, &Error) -> io::Result<()> + Send + Sync + 'static,
{
    fn handle(&self, w: &mut dyn ResponseWriter, err: &Error) -> io::Result<()> {
        self(w, err)
    }
}

/// Default error handler.
///
/// Self-writing errors write themselves. Everything else gets the status
/// from [`Error::status`] and a plain-text body with the error message;
/// panics get the generic reason phrase so nothing about the crash leaks.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainErrorHandler;

impl ErrorHandler for PlainErrorHandler {
    fn handle(&self, w: &mut dyn ResponseWriter, err: &Error) -> io::Result<()> {
        if let Some(custom) = err.as_response() {
            return custom.write_to(w);
        }

        let status = err.status();
        let body = match err {
            Error::Panic(_) => reason(status).to_owned(),
            _ => err.to_string(),
        };

        w.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        w.set_status(status);
        w.write(body.as_bytes())?;
        Ok(())
    }
}

fn reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Error")
}

#[cfg(test)]
mod tests {
    use http::Method;
    use serde::Deserialize;

    use super::*;
    use crate::error::HttpError;
    use crate::request::Params;
    use crate::writer::Transport;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Input {
        id: String,
        name: String,
        #[serde(default)]
        age: Option<u32>,
    }

    fn decode(req: RawRequest) -> Result<Input> {
        let value = FormDecoder.decode(&req)?;
        serde_json::from_value(value).map_err(Error::decode)
    }

    #[test]
    fn decodes_query_and_params() {
        let params = Params::from([("id".to_owned(), "7".to_owned())]);
        let req = RawRequest::get("/users/7?name=alice&id=ignored").with_params(params);

        let input = decode(req).unwrap();
        assert_eq!(input, Input { id: "7".into(), name: "alice".into(), age: None });
    }

    #[test]
    fn json_body_overlays_form() {
        let req = RawRequest::test(
            Method::POST,
            "/users?name=form",
            &[("content-type", "application/json; charset=utf-8")],
            r#"{"id":"1","name":"json","age":30}"#,
        );

        let input = decode(req).unwrap();
        assert_eq!(input.name, "json");
        assert_eq!(input.age, Some(30));
    }

    #[test]
    fn urlencoded_body() {
        let req = RawRequest::test(
            Method::POST,
            "/users",
            &[("content-type", FORM)],
            "id=3&name=bob",
        );
        assert_eq!(decode(req).unwrap().name, "bob");
    }

    #[test]
    fn malformed_json_is_decode_error() {
        let req = RawRequest::test(Method::POST, "/", &[("content-type", JSON)], "{not json");
        let err = FormDecoder.decode(&req).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn json_encoder_writes_value() {
        let mut t = Transport::new();
        JsonEncoder.encode(&mut t, &Value::from("OK")).unwrap();

        assert_eq!(t.headers()[CONTENT_TYPE], JSON);
        assert_eq!(t.body(), br#""OK""#);
    }

    #[test]
    fn plain_error_handler_hides_panics() {
        let mut t = Transport::new();
        PlainErrorHandler.handle(&mut t, &Error::Panic("secret detail".into())).unwrap();

        assert_eq!(t.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(t.body(), b"Internal Server Error");
    }

    #[test]
    fn plain_error_handler_defers_to_custom() {
        let mut t = Transport::new();
        let err: Error = HttpError::forbidden("nope").into();
        PlainErrorHandler.handle(&mut t, &err).unwrap();

        assert_eq!(t.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(t.body(), br#"{"message":"nope"}"#);
    }
}
