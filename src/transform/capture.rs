//! Buffered response capture.

use std::io;
use std::sync::Arc;

use bytes::BytesMut;
use http::{HeaderMap, StatusCode};
use tracing::error;

use super::{BoxedRawHandler, RawFuture, RawHandler, Transform};
use crate::request::RawRequest;
use crate::writer::{ResponseWriter, forbids_body};

/// Buffers a response so its final status and body can be decided late.
///
/// `set_status` only records the intended status (last write wins) and
/// `write` appends to an owned buffer. Nothing reaches the wrapped writer
/// until [`close`](ResponseCapture::close), which sends the recorded status
/// (`200 OK` if none) and then the buffer, unless that status forbids a
/// body, in which case the buffer is dropped.
///
/// Headers are not buffered: they pass straight through to the wrapped
/// writer, which has not committed anything yet.
pub struct ResponseCapture<'a> {
    inner: &'a mut dyn ResponseWriter,
    buf: BytesMut,
    status: Option<StatusCode>,
}

impl<'a> ResponseCapture<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter) -> Self {
        Self { inner, buf: BytesMut::new(), status: None }
    }

    /// Body bytes buffered so far.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Commits the recorded status and, if allowed, the buffered body.
    pub fn close(self) -> io::Result<()> {
        let status = self.status.unwrap_or(StatusCode::OK);
        self.inner.set_status(status);
        if forbids_body(status) {
            return Ok(());
        }
        if !self.buf.is_empty() {
            self.inner.write(&self.buf)?;
        }
        Ok(())
    }
}

impl ResponseWriter for ResponseCapture<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Empty writes never imply a status.
        if buf.is_empty() {
            return Ok(0);
        }
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn is_buffered(&self) -> bool {
        true
    }
}

// ── Transform ─────────────────────────────────────────────────────────────────

/// The transform that installs a [`ResponseCapture`] around the handler.
///
/// The route assembly always places it directly around compression and the
/// core dispatch; it is public so hand-built raw pipelines can use it too.
pub fn capture() -> impl Transform {
    |next: BoxedRawHandler| -> BoxedRawHandler { Arc::new(Capture { next }) }
}

struct Capture {
    next: BoxedRawHandler,
}

impl RawHandler for Capture {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: RawRequest) -> RawFuture<'a> {
        Box::pin(async move {
            let mut capture = ResponseCapture::new(w);
            self.next.serve(&mut capture, req).await;
            if let Err(e) = capture.close() {
                error!("flushing buffered response: {e}");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Transport;

    #[test]
    fn last_status_wins() {
        let mut t = Transport::new();
        let mut c = ResponseCapture::new(&mut t);
        c.set_status(StatusCode::CREATED);
        c.write(b"body").unwrap();
        c.set_status(StatusCode::ACCEPTED);
        c.close().unwrap();

        assert_eq!(t.status(), Some(StatusCode::ACCEPTED));
        assert_eq!(t.body(), b"body");
    }

    #[test]
    fn nothing_reaches_transport_before_close() {
        let mut t = Transport::new();
        {
            let mut c = ResponseCapture::new(&mut t);
            c.write(b"pending").unwrap();
            assert_eq!(c.buffered(), b"pending");
            // dropped without close
        }
        assert_eq!(t.status(), None);
        assert!(t.body().is_empty());
    }

    #[test]
    fn no_content_discards_buffer() {
        let mut t = Transport::new();
        let mut c = ResponseCapture::new(&mut t);
        c.write(b"should vanish").unwrap();
        c.set_status(StatusCode::NO_CONTENT);
        c.close().unwrap();

        assert_eq!(t.status(), Some(StatusCode::NO_CONTENT));
        assert!(t.body().is_empty());
    }

    #[test]
    fn empty_write_does_not_set_status() {
        let mut t = Transport::new();
        let mut c = ResponseCapture::new(&mut t);
        assert_eq!(c.write(b"").unwrap(), 0);
        assert_eq!(c.status(), None);
        c.close().unwrap();

        assert_eq!(t.status(), Some(StatusCode::OK));
        assert!(t.body().is_empty());
    }

    #[test]
    fn headers_pass_through() {
        let mut t = Transport::new();
        let mut c = ResponseCapture::new(&mut t);
        c.headers_mut().insert("x-trace", "abc".parse().unwrap());
        c.close().unwrap();

        assert_eq!(t.headers()["x-trace"], "abc");
    }
}
