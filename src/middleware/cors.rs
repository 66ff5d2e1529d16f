//! Cross-Origin Resource Sharing.

use std::sync::Arc;

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS,
    ACCESS_CONTROL_REQUEST_METHOD, ORIGIN, VARY,
};
use http::{HeaderMap, HeaderValue, Method};
use regex::Regex;
use tracing::warn;

use super::Middleware;
use crate::config::CorsConfig;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::reply::Reply;
use crate::request::Request;

/// Longest origin authority that is still matched against wildcards.
const MAX_AUTHORITY: usize = 253;

/// Adds CORS headers to every reply and answers preflight requests.
///
/// Preflight (`OPTIONS`) requests never reach the wrapped handler: they are
/// answered with `204` and the allow-* headers. Register the middleware on
/// an `OPTIONS` route for the paths that need preflight support.
pub fn cors(config: CorsConfig) -> Cors {
    Cors::new(config)
}

#[derive(Debug, Clone)]
pub struct Cors {
    policy: Arc<Policy>,
}

#[derive(Debug)]
struct Policy {
    origins: Vec<String>,
    patterns: Vec<Regex>,
    methods: Option<HeaderValue>,
    headers: Option<HeaderValue>,
    credentials: bool,
    max_age: Option<HeaderValue>,
}

impl Cors {
    pub fn new(config: CorsConfig) -> Self {
        let patterns = config
            .allow_origins
            .iter()
            .filter_map(|o| match glob(o) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(origin = %o, "ignoring unusable origin pattern: {e}");
                    None
                }
            })
            .collect();

        let policy = Policy {
            methods: join(&config.allow_methods),
            headers: join(&config.allow_headers),
            credentials: config.allow_credentials,
            max_age: config
                .max_age
                .filter(|d| !d.is_zero())
                .map(|d| HeaderValue::from(d.as_secs())),
            origins: config.allow_origins,
            patterns,
        };
        Self { policy: Arc::new(policy) }
    }
}

impl Default for Cors {
    fn default() -> Self {
        Self::new(CorsConfig::default())
    }
}

impl Middleware for Cors {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(CorsHandler { next, policy: Arc::clone(&self.policy) })
    }
}

struct CorsHandler {
    next: BoxedHandler,
    policy: Arc<Policy>,
}

impl ErasedHandler for CorsHandler {
    fn call(&self, req: Request) -> BoxFuture {
        let policy = Arc::clone(&self.policy);

        if req.method() != Method::OPTIONS {
            let allow_origin = policy.allow_origin(req.header(ORIGIN.as_str()).unwrap_or_default());
            let next = Arc::clone(&self.next);
            return Box::pin(async move {
                let mut reply = next.call(req).await;
                let headers = reply.headers_mut();
                headers.append(VARY, HeaderValue::from_static("origin"));
                policy.set_common(headers, allow_origin);
                reply
            });
        }

        let mut reply = Reply::empty();
        policy.preflight(&req, reply.headers_mut());
        Box::pin(async move { reply })
    }
}

impl Policy {
    fn set_common(&self, headers: &mut HeaderMap, allow_origin: Option<HeaderValue>) {
        if let Some(origin) = allow_origin {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        if self.credentials {
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
    }

    fn preflight(&self, req: &Request, headers: &mut HeaderMap) {
        for vary in [ORIGIN, ACCESS_CONTROL_REQUEST_METHOD, ACCESS_CONTROL_REQUEST_HEADERS] {
            headers.append(VARY, HeaderValue::from_name(vary));
        }

        let allow_origin = self.allow_origin(req.header(ORIGIN.as_str()).unwrap_or_default());
        self.set_common(headers, allow_origin);

        if let Some(methods) = &self.methods {
            headers.insert(ACCESS_CONTROL_ALLOW_METHODS, methods.clone());
        }

        let requested = req.headers().get(ACCESS_CONTROL_REQUEST_HEADERS);
        if let Some(allowed) = self.headers.as_ref().or(requested) {
            headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, allowed.clone());
        }

        if let Some(max_age) = &self.max_age {
            headers.insert(ACCESS_CONTROL_MAX_AGE, max_age.clone());
        }
    }

    /// The `access-control-allow-origin` value for `origin`, if it is allowed.
    fn allow_origin(&self, origin: &str) -> Option<HeaderValue> {
        let echo = || HeaderValue::from_str(origin).ok().filter(|v| !v.is_empty());

        for allowed in &self.origins {
            if allowed == "*" {
                return if self.credentials { echo() } else { Some(HeaderValue::from_static("*")) };
            }
            if allowed == origin || match_subdomain(origin, allowed) {
                return echo();
            }
        }

        let (_, authority) = origin.split_once("://")?;
        if authority.len() > MAX_AUTHORITY {
            return None;
        }
        self.patterns.iter().any(|re| re.is_match(origin)).then(echo).flatten()
    }
}

// ── Origin matching ───────────────────────────────────────────────────────────

/// Compiles an origin with `*` and `?` wildcards into an anchored regex.
fn glob(pattern: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    Regex::new(&format!("^{escaped}$"))
}

/// Matches `https://api.example.com` against `https://*.example.com`.
///
/// Schemes must be equal; labels are compared right to left until a `*`
/// label in the pattern.
fn match_subdomain(origin: &str, pattern: &str) -> bool {
    let (Some((scheme, authority)), Some((p_scheme, p_authority))) =
        (origin.split_once("://"), pattern.split_once("://"))
    else {
        return false;
    };
    if scheme != p_scheme || authority.len() > MAX_AUTHORITY {
        return false;
    }

    let mut labels = p_authority.rsplit('.');
    for label in authority.rsplit('.') {
        match labels.next() {
            Some("*") => return true,
            Some(p) if p == label => {}
            _ => return false,
        }
    }
    false
}

fn join(items: &[String]) -> Option<HeaderValue> {
    if items.is_empty() {
        return None;
    }
    HeaderValue::from_str(&items.join(",")).ok()
}
