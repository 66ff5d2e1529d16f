//! Incoming request types.
//!
//! [`RawRequest`] is what transforms see: the request head, the collected
//! body and the path parameters extracted by the router. The core dispatch
//! turns it into a [`Request`] by attaching the route's decoder, and that
//! is what handlers and middlewares receive.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;

use crate::codec::Decoder;
use crate::error::{Error, Result};

/// Path parameters extracted by the router, e.g. `id` for `/users/{id}`.
pub type Params = HashMap<String, String>;

/// A request as delivered by the transport, before decoding.
#[derive(Debug)]
pub struct RawRequest {
    pub(crate) parts: Parts,
    pub(crate) body: Bytes,
    pub(crate) params: Params,
    /// Set when the transport failed to read the body. Dispatch answers it
    /// with the route's error handler instead of calling the handler.
    pub(crate) body_error: Option<Error>,
}

impl RawRequest {
    pub fn new(parts: Parts, body: Bytes, params: Params) -> Self {
        Self { parts, body, params, body_error: None }
    }

    /// A request whose body could not be read; `err` is answered in place
    /// of calling the handler.
    pub fn with_body_error(mut self, err: Error) -> Self {
        self.body_error = Some(err);
        self
    }

    /// Builds a raw request from an `http::Request` with no path parameters.
    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::new(parts, body, Params::new())
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn params(&self) -> &Params { &self.params }

    /// Case-insensitive header lookup. Non-UTF-8 values are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name)?.to_str().ok()
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn get(uri: &str) -> Self {
        Self::test(Method::GET, uri, &[], "")
    }

    #[cfg(test)]
    pub(crate) fn test(method: Method, uri: &str, headers: &[(&str, &str)], body: &str) -> Self {
        let mut builder = http::Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        Self::from_http(builder.body(Bytes::copy_from_slice(body.as_bytes())).unwrap())
    }
}

/// The per-call request context handed to handlers and middlewares.
///
/// Owns everything it needs, so it can move into a timeout worker.
pub struct Request {
    raw: RawRequest,
    decoder: Arc<dyn Decoder>,
}

impl Request {
    pub(crate) fn new(raw: RawRequest, decoder: Arc<dyn Decoder>) -> Self {
        Self { raw, decoder }
    }

    pub fn method(&self) -> &Method { self.raw.method() }
    pub fn uri(&self) -> &Uri { self.raw.uri() }
    pub fn path(&self) -> &str { self.raw.uri().path() }
    pub fn headers(&self) -> &HeaderMap { self.raw.headers() }
    pub fn body(&self) -> &Bytes { self.raw.body() }
    pub fn params(&self) -> &Params { self.raw.params() }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.raw.header(name)
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.raw.param(key)
    }

    /// Decodes the request into `T` with the route's decoder.
    ///
    /// The default decoder merges query string, form body and path
    /// parameters, then overlays a JSON body. Failures come back as
    /// [`Error::Decode`] and, when propagated with `?`, become a `400`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.decoder.decode(&self.raw)?;
        serde_json::from_value(value).map_err(Error::decode)
    }

    pub fn into_raw(self) -> RawRequest {
        self.raw
    }

    #[cfg(test)]
    pub(crate) fn test(raw: RawRequest) -> Self {
        Self::new(raw, Arc::new(crate::codec::FormDecoder))
    }
}
