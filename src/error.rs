//! Unified error type.
//!
//! Every failure that happens after routing succeeds ends up as an [`Error`]
//! and is handed to the route's [`ErrorHandler`](crate::ErrorHandler) exactly
//! once. The same type also surfaces infrastructure failures: binding a
//! port, a fatal accept error, an unreadable config file.

use std::fmt;
use std::io;

use http::StatusCode;
use serde::Serialize;

use crate::writer::{ResponseWriter, WriteResponse};

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by switchyard's fallible operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The request could not be decoded into the handler's input type.
    #[error("decode: {0}")]
    Decode(#[source] BoxError),

    /// The business handler failed.
    #[error("{0}")]
    Handler(#[source] BoxError),

    /// An error that knows how to write itself to the wire.
    #[error("{0}")]
    Custom(Box<dyn CustomError>),

    /// The handler did not finish within the route's time budget.
    #[error("request timed out")]
    Timeout,

    /// The handler panicked. Carries the panic message for logs only.
    #[error("handler panicked: {0}")]
    Panic(String),

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),

    /// `Server::serve` was called after shutdown had already been triggered.
    #[error("server already closed")]
    Closed,
}

impl Error {
    /// Wraps a decoder failure.
    pub fn decode(err: impl Into<BoxError>) -> Self {
        Self::Decode(err.into())
    }

    /// Wraps an arbitrary business failure.
    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Handler(err.into())
    }

    /// The status this error maps to when no custom wire format applies.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::Closed => StatusCode::SERVICE_UNAVAILABLE,
            Self::Custom(e) => e.status(),
            Self::Handler(_) | Self::Panic(_) | Self::Io(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error's own wire format, if it has one.
    pub fn as_response(&self) -> Option<&dyn WriteResponse> {
        match self {
            Self::Custom(e) => Some(e.as_write_response()),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

// ── Custom errors ─────────────────────────────────────────────────────────────

/// An error that controls its own status line and body.
///
/// Implemented automatically for every `std::error::Error` that also
/// implements [`WriteResponse`]. Convert with `Error::Custom(Box::new(e))`
/// or via `From` for [`HttpError`].
pub trait CustomError: std::error::Error + WriteResponse {
    fn status(&self) -> StatusCode;

    #[doc(hidden)]
    fn as_write_response(&self) -> &dyn WriteResponse;
}

impl<T> CustomError for T
where
    T: std::error::Error + WriteResponse + HasStatus + 'static,
{
    fn status(&self) -> StatusCode {
        HasStatus::status(self)
    }

    fn as_write_response(&self) -> &dyn WriteResponse {
        self
    }
}

/// Status lookup used by the [`CustomError`] blanket impl.
pub trait HasStatus {
    fn status(&self) -> StatusCode;
}

// ── HttpError ─────────────────────────────────────────────────────────────────

/// A plain HTTP error: a status code plus a human-readable message.
///
/// Writes itself as `{"message": "..."}` with its own status, bypassing the
/// route's generic error handling.
#[derive(Debug, Clone, Serialize)]
pub struct HttpError {
    #[serde(skip)]
    pub status: StatusCode,
    pub message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

impl HasStatus for HttpError {
    fn status(&self) -> StatusCode {
        self.status
    }
}

impl WriteResponse for HttpError {
    fn write_to(&self, w: &mut dyn ResponseWriter) -> io::Result<()> {
        let body = serde_json::to_vec(self).map_err(io::Error::other)?;
        w.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        w.set_status(self.status);
        w.write(&body)?;
        Ok(())
    }
}

impl From<HttpError> for Error {
    fn from(e: HttpError) -> Self {
        Self::Custom(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_keeps_timeout_distinct() {
        assert_eq!(Error::Timeout.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(Error::Panic("boom".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(Error::decode("bad json").status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::other("nope").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn http_error_is_custom() {
        let err: Error = HttpError::not_found("no such user").into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert!(err.as_response().is_some());
        assert_eq!(err.to_string(), "no such user");
    }
}
