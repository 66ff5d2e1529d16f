//! Server lifecycle state and the shutdown trigger.
//!
//! ```text
//! Stopped ──serve──▶ Starting ──bound──▶ Serving ──trigger──▶ ShuttingDown ──drained──▶ Stopped
//! ```
//!
//! Every shutdown source (signal, handle, fatal accept error) goes through
//! [`Lifecycle::trigger`]; only the first call does anything.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Where a server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    Stopped = 0,
    Starting = 1,
    Serving = 2,
    ShuttingDown = 3,
}

impl ServerState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Starting,
            2 => Self::Serving,
            3 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Pending,
    Ready(SocketAddr),
    /// The server stopped without ever becoming ready.
    Closed,
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    token: CancellationToken,
    triggered: AtomicBool,
    state: AtomicU8,
    ready: watch::Sender<Readiness>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            triggered: AtomicBool::new(false),
            state: AtomicU8::new(ServerState::Stopped as u8),
            ready: watch::Sender::new(Readiness::Pending),
        }
    }

    /// Starts the shutdown sequence. Returns `true` only for the call that
    /// actually started it.
    pub(crate) fn trigger(&self, reason: &str) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!(reason, "shutdown triggered");
        // A server that is not running stays Stopped; `serve` will refuse it.
        let _ = self.state.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| {
            (s != ServerState::Stopped as u8).then_some(ServerState::ShuttingDown as u8)
        });
        self.token.cancel();
        true
    }

    pub(crate) fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves Stopped to Starting. Fails if the server is already running or
    /// shutdown has been triggered; in the latter case readiness resolves to
    /// `None`.
    pub(crate) fn try_start(&self) -> bool {
        let started = self
            .state
            .compare_exchange(
                ServerState::Stopped as u8,
                ServerState::Starting as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if !started {
            return false;
        }
        // Checked after the state change so a concurrent trigger is seen
        // either here or by its own state update.
        if self.triggered.load(Ordering::SeqCst) {
            self.stopped();
            return false;
        }
        true
    }

    /// Emits the readiness signal. The listener is bound but not accepting.
    ///
    /// Does nothing once shutdown has moved the server out of Starting.
    pub(crate) fn mark_ready(&self, addr: SocketAddr) {
        let serving = self
            .state
            .compare_exchange(
                ServerState::Starting as u8,
                ServerState::Serving as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if !serving {
            return;
        }
        self.ready.send_if_modified(|r| {
            if *r != Readiness::Pending {
                return false;
            }
            *r = Readiness::Ready(addr);
            true
        });
    }

    /// Final transition; releases anyone still waiting for readiness.
    pub(crate) fn stopped(&self) {
        self.state.store(ServerState::Stopped as u8, Ordering::SeqCst);
        self.ready.send_if_modified(|r| {
            if *r != Readiness::Pending {
                return false;
            }
            *r = Readiness::Closed;
            true
        });
    }

    pub(crate) async fn ready(&self) -> Option<SocketAddr> {
        let mut rx = self.ready.subscribe();
        let readiness = *rx.wait_for(|r| *r != Readiness::Pending).await.ok()?;
        match readiness {
            Readiness::Ready(addr) => Some(addr),
            Readiness::Pending | Readiness::Closed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn trigger_is_idempotent() {
        let lc = Lifecycle::new();
        assert!(lc.try_start());
        assert!(lc.trigger("first"));
        assert!(!lc.trigger("second"));
        assert!(lc.token().is_cancelled());
        assert_eq!(lc.state(), ServerState::ShuttingDown);
    }

    #[test]
    fn trigger_before_start_keeps_stopped() {
        let lc = Lifecycle::new();
        assert!(lc.trigger("early"));
        assert_eq!(lc.state(), ServerState::Stopped);
        assert!(lc.is_triggered());
    }

    #[tokio::test]
    async fn start_after_trigger_is_refused() {
        let lc = Lifecycle::new();
        assert!(lc.trigger("early"));

        assert!(!lc.try_start());
        assert_eq!(lc.state(), ServerState::Stopped);
        assert_eq!(lc.ready().await, None);
    }

    #[test]
    fn start_while_running_is_refused() {
        let lc = Lifecycle::new();
        assert!(lc.try_start());
        assert!(!lc.try_start());
        assert_eq!(lc.state(), ServerState::Starting);
    }

    #[tokio::test]
    async fn trigger_during_startup_suppresses_readiness() {
        let lc = Lifecycle::new();
        assert!(lc.try_start());
        assert!(lc.trigger("during bind"));
        assert_eq!(lc.state(), ServerState::ShuttingDown);

        lc.mark_ready("127.0.0.1:1000".parse().unwrap());
        assert_eq!(lc.state(), ServerState::ShuttingDown);
        lc.stopped();
        assert_eq!(lc.ready().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_triggers_collapse() {
        let lc = Arc::new(Lifecycle::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let lc = Arc::clone(&lc);
                let winners = Arc::clone(&winners);
                tokio::spawn(async move {
                    if lc.trigger(if i % 2 == 0 { "signal" } else { "handle" }) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn readiness_fires_once() {
        let lc = Lifecycle::new();
        let first: SocketAddr = "127.0.0.1:1000".parse().unwrap();
        assert!(lc.try_start());
        lc.mark_ready(first);
        lc.mark_ready("127.0.0.1:2000".parse().unwrap());
        lc.stopped();

        assert_eq!(lc.ready().await, Some(first));
    }

    #[tokio::test]
    async fn never_ready_resolves_to_none() {
        let lc = Arc::new(Lifecycle::new());
        let waiter = {
            let lc = Arc::clone(&lc);
            tokio::spawn(async move { lc.ready().await })
        };
        lc.stopped();
        assert_eq!(waiter.await.unwrap(), None);
    }
}
