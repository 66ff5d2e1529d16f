//! The write side of a request.
//!
//! Every stage of the pipeline writes through a [`ResponseWriter`]. At the
//! bottom sits the [`Transport`], which behaves like a socket: the first
//! status it sees is the one that goes out, and writing a body implicitly
//! commits `200 OK`. Stages above it (response capture, compression) wrap
//! the writer they are given and decide late what actually reaches it.

use std::io;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use tracing::debug;

/// Destination for a response: headers, a status line and body bytes.
///
/// `Send` is required because the writer is borrowed across `.await` points
/// inside connection tasks.
pub trait ResponseWriter: Send {
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Records the response status.
    fn set_status(&mut self, status: StatusCode);

    /// The status recorded so far, if any.
    fn status(&self) -> Option<StatusCode>;

    /// Appends body bytes. Returns the number of bytes accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// `true` when this writer holds the whole body until it is closed.
    ///
    /// Stages that must see a fully materialised body (compression) only
    /// activate on top of a buffering writer.
    fn is_buffered(&self) -> bool {
        false
    }
}

/// A value that serialises itself directly to a [`ResponseWriter`],
/// bypassing the route's generic encoder or error handler.
pub trait WriteResponse: Send + Sync {
    fn write_to(&self, w: &mut dyn ResponseWriter) -> io::Result<()>;
}

/// Returns `true` for statuses that must not carry a body.
pub fn forbids_body(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// The connection-level writer.
///
/// Mirrors what a socket would do with the calls it receives: the status
/// line is committed by the first `set_status` or the first body write and
/// cannot be changed afterwards. Once the pipeline returns, the connection
/// task turns it into a hyper response with [`Transport::into_response`].
#[derive(Debug, Default)]
pub struct Transport {
    headers: HeaderMap,
    status: Option<StatusCode>,
    body: BytesMut,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bytes written so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_response(self) -> http::Response<Full<Bytes>> {
        let status = self.status.unwrap_or(StatusCode::OK);
        let body = if forbids_body(status) { Bytes::new() } else { self.body.freeze() };

        let mut res = http::Response::new(Full::new(body));
        *res.status_mut() = status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl ResponseWriter for Transport {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn set_status(&mut self, status: StatusCode) {
        match self.status {
            Some(committed) => {
                debug!(%committed, ignored = %status, "superfluous status write on transport");
            }
            None => self.status = Some(status),
        }
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_first_status_wins() {
        let mut t = Transport::new();
        t.set_status(StatusCode::CREATED);
        t.set_status(StatusCode::BAD_REQUEST);
        assert_eq!(t.status(), Some(StatusCode::CREATED));
    }

    #[test]
    fn transport_write_commits_ok() {
        let mut t = Transport::new();
        t.write(b"hi").unwrap();
        t.set_status(StatusCode::NOT_FOUND);

        let res = t.into_response();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[test]
    fn no_body_statuses() {
        assert!(forbids_body(StatusCode::NO_CONTENT));
        assert!(forbids_body(StatusCode::NOT_MODIFIED));
        assert!(forbids_body(StatusCode::CONTINUE));
        assert!(!forbids_body(StatusCode::OK));
        assert!(!forbids_body(StatusCode::NOT_FOUND));
    }
}
