//! Timeout guard.
//!
//! ```text
//! Idle ──call──▶ Running ──result first──▶ Completed  (timer dropped)
//!                   │
//!                   └────timer first─────▶ TimedOut   (worker left running)
//! ```
//!
//! The wrapped handler runs on a detached tokio task that reports through a
//! oneshot channel. Sending on a oneshot never blocks, so a worker whose
//! caller already gave up still finishes, drops its result and exits: it
//! cannot get stuck waiting for a reader.
//!
//! The guard does not cancel a handler that overruns, it only stops waiting
//! for it. Work the handler does after the deadline still happens; handlers
//! that must stop early need their own cancellation.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::oneshot;
use tracing::{Instrument, Span, debug, warn};

use super::Middleware;
use super::recovery::panic_error;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::reply::Reply;
use crate::request::Request;

/// Bounds handler execution time. A zero duration disables the guard.
pub fn timeout(duration: Duration) -> Timeout {
    Timeout { duration }
}

#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    duration: Duration,
}

impl Middleware for Timeout {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        if self.duration.is_zero() {
            return next;
        }
        Arc::new(Guard { next, duration: self.duration })
    }
}

struct Guard {
    next: BoxedHandler,
    duration: Duration,
}

impl ErasedHandler for Guard {
    fn call(&self, req: Request) -> BoxFuture {
        let next = Arc::clone(&self.next);
        let duration = self.duration;

        Box::pin(async move {
            let (tx, rx) = oneshot::channel();

            let worker = async move {
                let reply = AssertUnwindSafe(async move { next.call(req).await })
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Reply::from(panic_error(panic)));

                if tx.send(reply).is_err() {
                    debug!("handler finished after its deadline, result discarded");
                }
            };
            tokio::spawn(worker.instrument(Span::current()));

            tokio::select! {
                biased;

                res = rx => res.unwrap_or_else(|_| {
                    Reply::from(Error::Panic("timeout worker exited without a result".into()))
                }),

                () = tokio::time::sleep(duration) => {
                    warn!(timeout_ms = duration.as_millis() as u64, "handler exceeded its deadline");
                    Reply::from(Error::Timeout)
                }
            }
        })
    }
}
