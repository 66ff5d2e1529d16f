//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts to SIGTERM, Ctrl-C, [`ServerHandle::shutdown`] or a
//! fatal accept error, whichever comes first, by:
//! 1. Immediately stopping `listener.accept()`. No new connections are made.
//! 2. Asking every open connection to finish its in-flight request and close.
//! 3. Waiting up to the grace period for them, then dropping the rest.
//! 4. Returning from [`Server::serve`], which lets `main` exit cleanly.
//!
//! Keep the grace period below `terminationGracePeriodSeconds`.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::health;
use crate::request::RawRequest;
use crate::router::Router;
use crate::writer::Transport;

mod lifecycle;

pub use lifecycle::ServerState;
use lifecycle::Lifecycle;

const DEFAULT_GRACE: Duration = Duration::from_secs(30);

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    diagnostics: Option<SocketAddr>,
    grace: Duration,
    lifecycle: Arc<Lifecycle>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use switchyard::Server;
    /// let server = Server::bind(([0, 0, 0, 0], 3000).into());
    /// ```
    pub fn bind(addr: SocketAddr) -> Self {
        Self {
            addr,
            diagnostics: None,
            grace: DEFAULT_GRACE,
            lifecycle: Arc::new(Lifecycle::new()),
        }
    }

    /// Listener, diagnostics listener and grace period from `config`.
    pub fn from_config(config: &Config) -> Self {
        let server = Self::bind(config.listen).grace_period(config.shutdown_timeout);
        match config.diagnostics {
            Some(addr) => server.diagnostics(addr),
            None => server,
        }
    }

    /// How long in-flight connections may keep running once shutdown starts.
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Serves `/healthz` and `/readyz` on a second listener at `addr`.
    pub fn diagnostics(mut self, addr: SocketAddr) -> Self {
        self.diagnostics = Some(addr);
        self
    }

    /// A handle to observe and stop this server from elsewhere.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle { lifecycle: Arc::clone(&self.lifecycle) }
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown. Fails with
    /// [`Error::Closed`] if shutdown was triggered before the call, or with
    /// the underlying I/O error if binding or accepting fails.
    pub async fn serve(self, router: Router) -> Result<()> {
        let lifecycle = Arc::clone(&self.lifecycle);
        if !lifecycle.try_start() {
            return Err(Error::Closed);
        }

        let result = self.run(router).await;
        lifecycle.stopped();
        info!("switchyard stopped");
        result
    }

    async fn run(self, router: Router) -> Result<()> {
        let lifecycle = self.lifecycle;
        let listener = TcpListener::bind(self.addr).await?;
        let local = listener.local_addr()?;
        let diagnostics = match self.diagnostics {
            Some(addr) => Some(TcpListener::bind(addr).await?),
            None => None,
        };

        // Every background task is tracked so `serve` never returns while
        // one of them is still running.
        let tracker = TaskTracker::new();
        tracker.spawn(watch_signals(Arc::clone(&lifecycle)));

        // The diagnostics listener outlives the main drain so `/readyz` can
        // report 503 while connections finish.
        let drained = CancellationToken::new();
        if let Some(listener) = diagnostics {
            let health = Arc::new(health::router(ServerHandle { lifecycle: Arc::clone(&lifecycle) }));
            info!(addr = %listener.local_addr()?, "diagnostics listening");
            tracker.spawn(accept_loop(
                listener,
                health,
                drained.clone(),
                Arc::clone(&lifecycle),
                self.grace,
            ));
        }

        lifecycle.mark_ready(local);
        info!(addr = %local, "switchyard listening");

        let main = tracker.spawn(accept_loop(
            listener,
            Arc::new(router),
            lifecycle.token().clone(),
            Arc::clone(&lifecycle),
            self.grace,
        ));
        tracker.close();

        let result = main.await.unwrap_or_else(|e| Err(Error::Io(io::Error::other(e))));
        drained.cancel();
        tracker.wait().await;
        result
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Cloneable control handle for a [`Server`].
#[derive(Debug, Clone)]
pub struct ServerHandle {
    lifecycle: Arc<Lifecycle>,
}

impl ServerHandle {
    /// Triggers graceful shutdown. Returns `true` if this call started it,
    /// `false` if shutdown was already under way.
    pub fn shutdown(&self) -> bool {
        self.lifecycle.trigger("requested")
    }

    /// Waits until the listener is bound and returns its address.
    ///
    /// Resolves to `None` if the server stopped before becoming ready.
    pub async fn ready(&self) -> Option<SocketAddr> {
        self.lifecycle.ready().await
    }

    pub fn state(&self) -> ServerState {
        self.lifecycle.state()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lifecycle.is_triggered()
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn accept_loop(
    listener: TcpListener,
    router: Arc<Router>,
    stop: CancellationToken,
    lifecycle: Arc<Lifecycle>,
    grace: Duration,
) -> Result<()> {
    // JoinSet tracks every spawned connection task so we can wait for
    // them all to finish during graceful shutdown.
    let mut conns = JoinSet::new();

    let result = loop {
        tokio::select! {
            // Check shutdown first so it immediately stops accepting new
            // connections, even if more are queued.
            biased;

            () = stop.cancelled() => break Ok(()),

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => match on_accept_error(&lifecycle, e) {
                        ControlFlow::Continue(()) => continue,
                        ControlFlow::Break(err) => break Err(err),
                    },
                };
                conns.spawn(serve_connection(stream, peer, Arc::clone(&router), stop.clone()));
            }

            // Reap finished connection tasks so the JoinSet does not grow
            // without bound on long-running servers.
            Some(_) = conns.join_next(), if !conns.is_empty() => {}
        }
    };
    drop(listener);

    info!(in_flight = conns.len(), "draining connections");
    let drain = async { while conns.join_next().await.is_some() {} };
    if tokio::time::timeout(grace, drain).await.is_err() {
        warn!(remaining = conns.len(), "grace period elapsed, closing connections");
        conns.shutdown().await;
    }
    result
}

/// Decides what a failed `accept` means: a transient per-connection error
/// is skipped, anything else is a failing listener and triggers shutdown.
fn on_accept_error(lifecycle: &Lifecycle, e: io::Error) -> ControlFlow<Error> {
    if is_transient(&e) {
        warn!("accept error: {e}");
        return ControlFlow::Continue(());
    }
    error!("listener failed: {e}");
    lifecycle.trigger("listener failure");
    ControlFlow::Break(Error::Io(e))
}

/// Per-connection errors the listener recovers from.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Arc<Router>,
    stop: CancellationToken,
) {
    // TokioIo adapts tokio's AsyncRead/AsyncWrite to the hyper IO traits.
    let io = TokioIo::new(stream);

    // Called once per request on the connection, not once per connection.
    let svc = service_fn(move |req| {
        let router = Arc::clone(&router);
        async move { dispatch(&router, req).await }
    });

    // `auto::Builder` handles both HTTP/1.1 and HTTP/2.
    let builder = ConnBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection(io, svc);
    tokio::pin!(conn);

    let res = tokio::select! {
        res = conn.as_mut() => res,
        () = stop.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = res {
        error!(%peer, "connection error: {e}");
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Core hot path: routes one request and produces one response.
///
/// Infallible: every failure is answered with a status code.
async fn dispatch(
    router: &Router,
    req: hyper::Request<Incoming>,
) -> std::result::Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let Some((pipeline, params)) = router.lookup(&parts.method, parts.uri.path()) else {
        return Ok(status_only(StatusCode::NOT_FOUND));
    };

    let req = match body.collect().await {
        Ok(collected) => RawRequest::new(parts, collected.to_bytes(), params),
        Err(e) => {
            warn!("reading request body: {e}");
            RawRequest::new(parts, Bytes::new(), params).with_body_error(Error::decode(e))
        }
    };

    let mut transport = Transport::new();
    pipeline.serve(&mut transport, req).await;
    Ok(transport.into_response())
}

fn status_only(status: StatusCode) -> http::Response<Full<Bytes>> {
    let mut res = http::Response::new(Full::new(Bytes::new()));
    *res.status_mut() = status;
    res
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Triggers shutdown on the first process signal, unless something else
/// triggers it first.
async fn watch_signals(lifecycle: Arc<Lifecycle>) {
    tokio::select! {
        reason = shutdown_signal() => {
            lifecycle.trigger(reason);
        }
        () = lifecycle.token().cancelled() => {}
    }
}

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by `kubectl` and the
/// Kubernetes control plane) and **SIGINT** (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` never resolves: on non-Unix platforms the SIGTERM arm is
    // effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => "SIGINT",
        () = sigterm => "SIGTERM",
    }
}
