//! Gzip compression of buffered responses.

use std::io::{self, Write};
use std::sync::Arc;

use flate2::Compression;
use flate2::write::GzEncoder;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, VARY};
use http::{HeaderMap, HeaderValue, StatusCode};
use tracing::{error, warn};

use super::{BoxedRawHandler, RawFuture, RawHandler, Transform};
use crate::config::GzipConfig;
use crate::request::RawRequest;
use crate::writer::{ResponseWriter, forbids_body};

const GZIP: &str = "gzip";

/// Compresses the response body when the client accepts gzip.
///
/// The stage only activates when the request's `accept-encoding` allows
/// gzip *and* the writer it receives buffers the whole body (a
/// [`ResponseCapture`](super::ResponseCapture)). Otherwise the request
/// passes through untouched.
#[derive(Debug, Clone, Copy)]
pub struct Gzip {
    level: Compression,
}

impl Gzip {
    pub fn new(config: &GzipConfig) -> Self {
        Self { level: compression_level(config.level) }
    }
}

impl Default for Gzip {
    fn default() -> Self {
        Self { level: Compression::default() }
    }
}

impl Transform for Gzip {
    fn wrap(&self, next: BoxedRawHandler) -> BoxedRawHandler {
        Arc::new(GzipHandler { next, level: self.level })
    }
}

/// Out-of-range levels fall back to the library default instead of failing.
fn compression_level(level: i32) -> Compression {
    match u32::try_from(level) {
        Ok(level) if level <= 9 => Compression::new(level),
        _ => {
            if level != -1 {
                warn!(level, "invalid gzip level, using default compression");
            }
            Compression::default()
        }
    }
}

/// Returns `true` if `accept-encoding` lists gzip (or `*`) with a non-zero q.
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|item| {
            let mut parts = item.split(';');
            let coding = parts.next().unwrap_or_default().trim();
            if !(coding.eq_ignore_ascii_case(GZIP) || coding == "*") {
                return false;
            }
            !parts.any(|p| {
                p.trim()
                    .strip_prefix("q=")
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .is_some_and(|q| q == 0.0)
            })
        })
}

struct GzipHandler {
    next: BoxedRawHandler,
    level: Compression,
}

impl RawHandler for GzipHandler {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: RawRequest) -> RawFuture<'a> {
        if !accepts_gzip(req.headers()) || !w.is_buffered() {
            return self.next.serve(w, req);
        }

        Box::pin(async move {
            let mut gz = GzipWriter::new(w, self.level);
            self.next.serve(&mut gz, req).await;
            if let Err(e) = gz.close() {
                error!("finishing gzip stream: {e}");
            }
        })
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// `io::Write` adapter over the wrapped writer; can be switched to a sink.
struct Sink<'a> {
    inner: &'a mut dyn ResponseWriter,
    discard: bool,
}

impl Write for Sink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.discard {
            return Ok(buf.len());
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that gzips body bytes into the writer it wraps.
pub struct GzipWriter<'a> {
    encoder: GzEncoder<Sink<'a>>,
}

impl<'a> GzipWriter<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter, level: Compression) -> Self {
        let headers = inner.headers_mut();
        headers.remove(CONTENT_LENGTH);
        headers.append(VARY, HeaderValue::from_static("accept-encoding"));

        Self { encoder: GzEncoder::new(Sink { inner, discard: false }, level) }
    }

    /// Finishes the stream.
    ///
    /// If a no-body status was recorded, pending compressed output goes to a
    /// sink rather than leaving a truncated stream in the buffer.
    pub fn close(mut self) -> io::Result<()> {
        let sink = self.encoder.get_mut();
        sink.inner.headers_mut().remove(CONTENT_LENGTH);

        let status = sink.inner.status().unwrap_or(StatusCode::OK);
        if forbids_body(status) {
            sink.discard = true;
        } else {
            sink.inner
                .headers_mut()
                .insert(CONTENT_ENCODING, HeaderValue::from_static(GZIP));
        }

        self.encoder.finish().map(drop)
    }
}

impl ResponseWriter for GzipWriter<'_> {
    fn headers(&self) -> &HeaderMap {
        self.encoder.get_ref().inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.encoder.get_mut().inner.headers_mut()
    }

    fn set_status(&mut self, status: StatusCode) {
        self.encoder.get_mut().inner.set_status(status);
    }

    fn status(&self) -> Option<StatusCode> {
        self.encoder.get_ref().inner.status()
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.encoder.write(buf)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;
    use crate::transform::ResponseCapture;
    use crate::writer::Transport;

    /// Core that always writes `plain`.
    struct Plain;

    impl RawHandler for Plain {
        fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, _req: RawRequest) -> RawFuture<'a> {
            Box::pin(async move {
                w.write(b"plain").unwrap();
            })
        }
    }

    fn gzipped() -> BoxedRawHandler {
        Gzip::default().wrap(Arc::new(Plain))
    }

    fn accepting() -> RawRequest {
        RawRequest::test(http::Method::GET, "/", &[("accept-encoding", "gzip")], "")
    }

    fn gunzip(bytes: &[u8]) -> String {
        let mut out = String::new();
        GzDecoder::new(bytes).read_to_string(&mut out).unwrap();
        out
    }

    fn headers(accept: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(ACCEPT_ENCODING, accept.parse().unwrap());
        h
    }

    #[test]
    fn accept_encoding_negotiation() {
        assert!(accepts_gzip(&headers("gzip")));
        assert!(accepts_gzip(&headers("deflate, GZIP;q=0.5")));
        assert!(accepts_gzip(&headers("*")));
        assert!(!accepts_gzip(&headers("gzip;q=0")));
        assert!(!accepts_gzip(&headers("br, deflate")));
        assert!(!accepts_gzip(&HeaderMap::new()));
    }

    #[test]
    fn bad_level_falls_back_to_default() {
        assert_eq!(compression_level(42).level(), Compression::default().level());
        assert_eq!(compression_level(-7).level(), Compression::default().level());
        assert_eq!(compression_level(1).level(), 1);
    }

    #[test]
    fn compresses_into_capture() {
        let mut t = Transport::new();
        t.headers_mut().insert(CONTENT_LENGTH, HeaderValue::from_static("11"));

        let mut capture = ResponseCapture::new(&mut t);
        let mut gz = GzipWriter::new(&mut capture, Compression::default());
        gz.write(b"hello world").unwrap();
        gz.close().unwrap();
        capture.close().unwrap();

        assert_eq!(t.headers()[CONTENT_ENCODING], "gzip");
        assert!(t.headers().get(CONTENT_LENGTH).is_none());
        assert_eq!(gunzip(t.body()), "hello world");
    }

    #[test]
    fn no_content_emits_nothing() {
        let mut t = Transport::new();
        let mut capture = ResponseCapture::new(&mut t);
        let mut gz = GzipWriter::new(&mut capture, Compression::default());
        gz.write(b"dropped").unwrap();
        gz.set_status(StatusCode::NO_CONTENT);
        gz.close().unwrap();
        capture.close().unwrap();

        assert_eq!(t.status(), Some(StatusCode::NO_CONTENT));
        assert!(t.headers().get(CONTENT_ENCODING).is_none());
        assert!(t.body().is_empty());
    }

    #[tokio::test]
    async fn unbuffered_writer_passes_through() {
        let mut t = Transport::new();
        gzipped().serve(&mut t, accepting()).await;

        assert_eq!(t.body(), b"plain");
        assert!(t.headers().get(CONTENT_ENCODING).is_none());
        assert!(t.headers().get(VARY).is_none());
    }

    #[tokio::test]
    async fn missing_accept_encoding_passes_through() {
        let mut t = Transport::new();
        let mut capture = ResponseCapture::new(&mut t);
        gzipped().serve(&mut capture, RawRequest::get("/")).await;
        capture.close().unwrap();

        assert_eq!(t.body(), b"plain");
        assert!(t.headers().get(CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn buffered_and_accepted_compresses() {
        let mut t = Transport::new();
        let mut capture = ResponseCapture::new(&mut t);
        gzipped().serve(&mut capture, accepting()).await;
        capture.close().unwrap();

        assert_eq!(t.headers()[CONTENT_ENCODING], "gzip");
        assert_eq!(gunzip(t.body()), "plain");
    }
}
