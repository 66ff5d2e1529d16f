//! Route options and pipeline assembly.
//!
//! A [`Route`] is a handler plus the options that shape its pipeline. When
//! it is registered, the router merges its own defaults, any enclosing
//! group's options and the route's options, then assembles one
//! [`Pipeline`]:
//!
//! ```text
//! transforms… → capture → gzip → dispatch
//!                                   │
//!                                   └ recovery → timeout → middlewares… → handler
//! ```
//!
//! Dispatch decodes nothing itself: it hands the handler a [`Request`]
//! carrying the route's decoder, then writes the [`Reply`] with either the
//! error handler or the encoder, never both.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use tracing::{error, warn};

use crate::codec::{Decoder, Encoder, ErrorHandler, FormDecoder, JsonEncoder, PlainErrorHandler};
use crate::config::GzipConfig;
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{self, Middleware};
use crate::reply::Payload;
use crate::request::{RawRequest, Request};
use crate::transform::{self, BoxedRawHandler, Gzip, RawFuture, RawHandler, Transform};
use crate::writer::ResponseWriter;

// ── RouteOptions ──────────────────────────────────────────────────────────────

/// Options shared by routes, groups and router defaults.
///
/// Merging an inner scope onto an outer one appends middlewares and
/// transforms (outer first, so outer layers wrap inner ones) and lets every
/// option the inner scope sets override the outer value.
#[derive(Clone, Default)]
pub struct RouteOptions {
    middlewares: Vec<Arc<dyn Middleware>>,
    transforms: Vec<Arc<dyn Transform>>,
    decoder: Option<Arc<dyn Decoder>>,
    encoder: Option<Arc<dyn Encoder>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    timeout: Option<Duration>,
    recovery: Option<bool>,
    gzip: Option<GzipConfig>,
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn transform(mut self, transform: impl Transform) -> Self {
        self.transforms.push(Arc::new(transform));
        self
    }

    pub fn decoder(mut self, decoder: impl Decoder) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    pub fn encoder(mut self, encoder: impl Encoder) -> Self {
        self.encoder = Some(Arc::new(encoder));
        self
    }

    pub fn error_handler(mut self, handler: impl ErrorHandler) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Time budget for the handler. `Duration::ZERO` disables the guard.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn recovery(mut self, enabled: bool) -> Self {
        self.recovery = Some(enabled);
        self
    }

    pub fn gzip(mut self, config: GzipConfig) -> Self {
        self.gzip = Some(config);
        self
    }

    /// `inner` layered on top of `self`.
    pub fn merged(&self, inner: &RouteOptions) -> RouteOptions {
        RouteOptions {
            middlewares: self.middlewares.iter().chain(&inner.middlewares).cloned().collect(),
            transforms: self.transforms.iter().chain(&inner.transforms).cloned().collect(),
            decoder: inner.decoder.clone().or_else(|| self.decoder.clone()),
            encoder: inner.encoder.clone().or_else(|| self.encoder.clone()),
            error_handler: inner.error_handler.clone().or_else(|| self.error_handler.clone()),
            timeout: inner.timeout.or(self.timeout),
            recovery: inner.recovery.or(self.recovery),
            gzip: inner.gzip.or(self.gzip),
        }
    }
}

impl fmt::Debug for RouteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteOptions")
            .field("middlewares", &self.middlewares.len())
            .field("transforms", &self.transforms.len())
            .field("timeout", &self.timeout)
            .field("recovery", &self.recovery)
            .field("gzip", &self.gzip)
            .finish_non_exhaustive()
    }
}

// ── Route ─────────────────────────────────────────────────────────────────────

/// A handler bound to a method and path, with its own options.
///
/// ```rust
/// use std::time::Duration;
/// use switchyard::{Request, Route, RouteOptions, Router};
///
/// async fn report(_req: Request) -> &'static str { "done" }
///
/// let app = Router::new().route(
///     Route::get("/report", report)
///         .with(RouteOptions::new().timeout(Duration::from_secs(2))),
/// );
/// ```
pub struct Route {
    pub(crate) method: Method,
    pub(crate) path: String,
    handler: BoxedHandler,
    pub(crate) options: RouteOptions,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            method,
            path: path.into(),
            handler: handler.into_boxed_handler(),
            options: RouteOptions::default(),
        }
    }

    pub fn get(path: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::GET, path, handler)
    }

    pub fn post(path: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::POST, path, handler)
    }

    /// Layers `options` on top of the route's current options.
    pub fn with(mut self, options: RouteOptions) -> Self {
        self.options = self.options.merged(&options);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Assembles the executable pipeline, with `defaults` as the outermost
    /// option scope.
    pub fn build(self, defaults: &RouteOptions) -> Pipeline {
        let opts = defaults.merged(&self.options);

        let mut handler = middleware::chain(&opts.middlewares, self.handler);
        if let Some(duration) = opts.timeout {
            handler = middleware::timeout(duration).wrap(handler);
        }
        if opts.recovery.unwrap_or(false) {
            handler = middleware::recovery().wrap(handler);
        }

        let mut raw: BoxedRawHandler = Arc::new(Dispatch {
            handler,
            decoder: opts.decoder.unwrap_or_else(|| Arc::new(FormDecoder)),
            encoder: opts.encoder.unwrap_or_else(|| Arc::new(JsonEncoder)),
            error_handler: opts.error_handler.unwrap_or_else(|| Arc::new(PlainErrorHandler)),
        });
        if let Some(gzip) = opts.gzip.filter(|g| g.enabled) {
            raw = Gzip::new(&gzip).wrap(raw);
        }
        raw = transform::capture().wrap(raw);

        Pipeline {
            method: self.method,
            path: self.path,
            handle: transform::chain(&opts.transforms, raw),
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// One route, fully assembled. Cheap to share between connections.
pub struct Pipeline {
    method: Method,
    path: String,
    handle: BoxedRawHandler,
}

impl Pipeline {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The registered path pattern, e.g. `/users/{id}`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Runs one request through the pipeline, writing the response to `w`.
    pub async fn serve(&self, w: &mut dyn ResponseWriter, req: RawRequest) {
        self.handle.serve(w, req).await;
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

// ── Core dispatch ─────────────────────────────────────────────────────────────

/// Innermost raw handler: calls the middleware chain and writes its reply.
struct Dispatch {
    handler: BoxedHandler,
    decoder: Arc<dyn Decoder>,
    encoder: Arc<dyn Encoder>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl Dispatch {
    fn write_error(&self, w: &mut dyn ResponseWriter, err: &Error) {
        if err.status().is_server_error() && !matches!(err, Error::Panic(_)) {
            error!(error = %err, "request failed");
        }
        if let Err(e) = self.error_handler.handle(w, err) {
            warn!(error = %err, "writing error response: {e}");
        }
    }
}

impl RawHandler for Dispatch {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, mut req: RawRequest) -> RawFuture<'a> {
        Box::pin(async move {
            if let Some(err) = req.body_error.take() {
                self.write_error(w, &err);
                return;
            }

            let req = Request::new(req, Arc::clone(&self.decoder));
            let (headers, result) = self.handler.call(req).await.into_parts();

            for (name, value) in &headers {
                w.headers_mut().append(name.clone(), value.clone());
            }

            match result {
                Err(err) => self.write_error(w, &err),
                Ok(Payload::Empty) => w.set_status(http::StatusCode::NO_CONTENT),
                Ok(Payload::Value(value)) => {
                    if let Err(e) = self.encoder.encode(w, &value) {
                        warn!("encoding response: {e}");
                    }
                }
                Ok(Payload::Custom(custom)) => {
                    if let Err(e) = custom.write_to(w) {
                        warn!("writing custom response: {e}");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;
    use http::header::{CONTENT_ENCODING, CONTENT_TYPE};
    use http::StatusCode;
    use serde::Deserialize;
    use tracing_test::traced_test;

    use super::*;
    use crate::error::HttpError;
    use crate::reply::Reply;
    use crate::writer::Transport;

    async fn run(route: Route, defaults: &RouteOptions, req: RawRequest) -> Transport {
        let pipeline = route.build(defaults);
        let mut t = Transport::new();
        pipeline.serve(&mut t, req).await;
        t
    }

    #[tokio::test]
    async fn value_is_encoded_as_json() {
        let t = run(
            Route::get("/", |_req: Request| async { "OK" }),
            &RouteOptions::new(),
            RawRequest::get("/"),
        )
        .await;

        assert_eq!(t.status(), Some(StatusCode::OK));
        assert_eq!(t.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(t.body(), br#""OK""#);
    }

    #[tokio::test]
    async fn empty_payload_is_no_content() {
        let t = run(
            Route::get("/", |_req: Request| async { Reply::empty() }),
            &RouteOptions::new(),
            RawRequest::get("/"),
        )
        .await;

        assert_eq!(t.status(), Some(StatusCode::NO_CONTENT));
        assert!(t.body().is_empty());
    }

    #[tokio::test]
    async fn timeout_becomes_408() {
        let route = Route::get("/", |_req: Request| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            "late"
        });
        let t = run(route, &RouteOptions::new().timeout(Duration::from_millis(20)), RawRequest::get("/")).await;

        assert_eq!(t.status(), Some(StatusCode::REQUEST_TIMEOUT));
    }

    #[tokio::test]
    #[traced_test]
    async fn recovered_panic_is_generic_500() {
        let route = Route::get("/", |_req: Request| async {
            if true {
                panic!("boom");
            }
            ""
        });
        let t = run(route, &RouteOptions::new().recovery(true), RawRequest::get("/")).await;

        assert_eq!(t.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(t.body(), b"Internal Server Error");
        assert!(logs_contain("boom"));
    }

    #[tokio::test]
    async fn gzip_when_accepted() {
        let route = Route::get("/", |_req: Request| async { "compress me please" });
        let defaults = RouteOptions::new().gzip(GzipConfig { enabled: true, level: 9 });
        let req = RawRequest::test(Method::GET, "/", &[("accept-encoding", "gzip, br")], "");
        let t = run(route, &defaults, req).await;

        assert_eq!(t.headers()[CONTENT_ENCODING], "gzip");
        let mut body = String::new();
        GzDecoder::new(t.body()).read_to_string(&mut body).unwrap();
        assert_eq!(body, r#""compress me please""#);
    }

    #[tokio::test]
    async fn decode_failure_is_400() {
        #[derive(Deserialize)]
        #[allow(dead_code)]
        struct Input {
            count: u32,
        }

        let route = Route::post("/", |req: Request| async move {
            let input: Input = req.decode()?;
            Ok::<_, Error>(input.count.to_string())
        });
        let req = RawRequest::test(Method::POST, "/", &[("content-type", "application/json")], "{");
        let t = run(route, &RouteOptions::new(), req).await;

        assert_eq!(t.status(), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn unreadable_body_goes_to_the_error_handler() {
        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let route = {
            let called = Arc::clone(&called);
            Route::post("/", move |_req: Request| {
                called.store(true, std::sync::atomic::Ordering::SeqCst);
                async { "unreachable" }
            })
        };
        let defaults = RouteOptions::new().error_handler(
            |w: &mut dyn ResponseWriter, err: &Error| -> std::io::Result<()> {
                assert!(matches!(err, Error::Decode(_)));
                w.set_status(StatusCode::IM_A_TEAPOT);
                Ok(())
            },
        );
        let req = RawRequest::test(Method::POST, "/", &[], "").with_body_error(Error::decode("truncated body"));
        let t = run(route, &defaults, req).await;

        assert_eq!(t.status(), Some(StatusCode::IM_A_TEAPOT));
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn custom_error_writes_itself() {
        let route = Route::get("/", |_req: Request| async {
            Err::<(), _>(HttpError::new(StatusCode::IM_A_TEAPOT, "short and stout"))
        });
        let t = run(route, &RouteOptions::new(), RawRequest::get("/")).await;

        assert_eq!(t.status(), Some(StatusCode::IM_A_TEAPOT));
        assert_eq!(t.body(), br#"{"message":"short and stout"}"#);
    }

    #[tokio::test]
    async fn reply_headers_reach_the_response() {
        let route = Route::get("/", |_req: Request| async {
            let mut reply = Reply::ok("OK");
            reply.headers_mut().insert("x-request-id", "abc".parse().unwrap());
            reply
        });
        let t = run(route, &RouteOptions::new(), RawRequest::get("/")).await;

        assert_eq!(t.headers()["x-request-id"], "abc");
    }

    #[test]
    fn merge_appends_layers_and_overrides_scalars() {
        let noop = |next: BoxedHandler| next;
        let outer = RouteOptions::new().middleware(noop).timeout(Duration::from_secs(1)).recovery(true);
        let inner = RouteOptions::new().middleware(noop).timeout(Duration::from_secs(5));

        let merged = outer.merged(&inner);
        assert_eq!(merged.middlewares.len(), 2);
        assert_eq!(merged.timeout, Some(Duration::from_secs(5)));
        assert_eq!(merged.recovery, Some(true));
    }
}
