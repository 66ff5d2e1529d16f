//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. Every registration is
//! assembled into its [`Pipeline`] immediately, so options set on the
//! router or a group apply to the routes registered *after* them.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::codec::ErrorHandler;
use crate::config::Config;
use crate::handler::Handler;
use crate::middleware::{self, Middleware};
use crate::request::Params;
use crate::route::{Pipeline, Route, RouteOptions};
use crate::transform::Transform;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Each registration returns `self` so calls chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Arc<Pipeline>>>,
    defaults: RouteOptions,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), defaults: RouteOptions::default() }
    }

    /// A router whose defaults come from `config`: recovery, request
    /// timeout, gzip and, when configured, the CORS middleware.
    pub fn with_config(config: &Config) -> Self {
        let mut options = RouteOptions::new().recovery(config.recovery).gzip(config.gzip);
        if let Some(timeout) = config.request_timeout {
            options = options.timeout(timeout);
        }
        if let Some(cors) = &config.cors {
            options = options.middleware(middleware::cors(cors.clone()));
        }
        Self::new().defaults(options)
    }

    /// Layers `options` onto the defaults for routes registered from now on.
    pub fn defaults(mut self, options: RouteOptions) -> Self {
        self.defaults = self.defaults.merged(&options);
        self
    }

    pub fn middleware(self, middleware: impl Middleware) -> Self {
        self.defaults(RouteOptions::new().middleware(middleware))
    }

    pub fn transform(self, transform: impl Transform) -> Self {
        self.defaults(RouteOptions::new().transform(transform))
    }

    pub fn error_handler(self, handler: impl ErrorHandler) -> Self {
        self.defaults(RouteOptions::new().error_handler(handler))
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust
    /// # use http::Method;
    /// # use switchyard::{Request, Router};
    /// # async fn get_user(_: Request) -> &'static str { "" }
    /// # async fn create_user(_: Request) -> &'static str { "" }
    /// # async fn delete_user(_: Request) {}
    /// Router::new()
    ///     .on(Method::DELETE, "/users/{id}", delete_user)
    ///     .on(Method::GET,    "/users/{id}", get_user)
    ///     .on(Method::POST,   "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the path is invalid or conflicts with a registered route.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.route(Route::new(method, path, handler))
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Registers a route with its own options.
    pub fn route(mut self, route: Route) -> Self {
        let pipeline = route.build(&self.defaults);
        let path = pipeline.path().to_owned();
        self.routes
            .entry(pipeline.method().clone())
            .or_default()
            .insert(path.as_str(), Arc::new(pipeline))
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Registers the routes of a group sharing `prefix`.
    ///
    /// ```rust
    /// # use std::time::Duration;
    /// # use switchyard::{Request, Router, RouteOptions};
    /// # async fn list(_: Request) -> &'static str { "" }
    /// # async fn show(_: Request) -> &'static str { "" }
    /// Router::new().group("/api/v1/", |g| {
    ///     g.with(RouteOptions::new().timeout(Duration::from_secs(1)))
    ///         .get("/items", list)
    ///         .get("/items/{id}", show)
    /// });
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `prefix` does not begin with `/`.
    pub fn group(mut self, prefix: &str, f: impl FnOnce(Group) -> Group) -> Self {
        let group = f(Group::new(prefix, RouteOptions::default()));
        for route in group.routes {
            self = self.route(route);
        }
        self
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Option<(Arc<Pipeline>, Params)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let pipeline = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((pipeline, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

// ── Group ─────────────────────────────────────────────────────────────────────

/// Routes sharing a path prefix and options. Created by [`Router::group`].
pub struct Group {
    prefix: String,
    options: RouteOptions,
    routes: Vec<Route>,
}

impl Group {
    fn new(prefix: &str, options: RouteOptions) -> Self {
        assert!(prefix.starts_with('/'), "group prefix must begin with '/' in `{prefix}`");
        let prefix = prefix.strip_suffix('/').unwrap_or(prefix).to_owned();
        Self { prefix, options, routes: Vec::new() }
    }

    /// Layers `options` onto the group for routes registered from now on.
    pub fn with(mut self, options: RouteOptions) -> Self {
        self.options = self.options.merged(&options);
        self
    }

    pub fn middleware(self, middleware: impl Middleware) -> Self {
        self.with(RouteOptions::new().middleware(middleware))
    }

    pub fn transform(self, transform: impl Transform) -> Self {
        self.with(RouteOptions::new().transform(transform))
    }

    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.route(Route::new(method, path, handler))
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    pub fn route(mut self, mut route: Route) -> Self {
        route.path = format!("{}{}", self.prefix, route.path);
        route.options = self.options.merged(&route.options);
        self.routes.push(route);
        self
    }

    /// A nested group: prefixes concatenate, options inherit.
    pub fn group(mut self, prefix: &str, f: impl FnOnce(Group) -> Group) -> Self {
        let mut child = Group::new(prefix, self.options.clone());
        child.prefix = format!("{}{}", self.prefix, child.prefix);
        self.routes.extend(f(child).routes);
        self
    }
}
