//! Panic recovery.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::error;

use super::Middleware;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::reply::Reply;
use crate::request::Request;

/// Turns a panic anywhere inside the wrapped chain into [`Error::Panic`].
///
/// The panic message and a backtrace are logged at `error!`; the client only
/// ever sees the error handler's generic `500` response.
pub fn recovery() -> Recovery {
    Recovery
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Recovery;

impl Middleware for Recovery {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Recover { next })
    }
}

struct Recover {
    next: BoxedHandler,
}

impl ErasedHandler for Recover {
    fn call(&self, req: Request) -> BoxFuture {
        let next = Arc::clone(&self.next);
        Box::pin(async move {
            AssertUnwindSafe(async move { next.call(req).await })
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Reply::from(panic_error(panic)))
        })
    }
}

/// Logs a caught panic and converts it into a typed error.
pub(crate) fn panic_error(panic: Box<dyn Any + Send>) -> Error {
    let message = panic_message(panic.as_ref());
    error!(
        panic = %message,
        backtrace = %Backtrace::force_capture(),
        "recovered from handler panic"
    );
    Error::Panic(message)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::handler;
    use crate::request::RawRequest;

    #[tokio::test]
    #[traced_test]
    async fn panic_becomes_internal_error() {
        let h = recovery().wrap(handler::boxed(|_req: Request| async {
            if true {
                panic!("boom");
            }
            Reply::empty()
        }));

        let reply = h.call(Request::test(RawRequest::get("/"))).await;

        assert!(matches!(reply.error(), Some(Error::Panic(msg)) if msg == "boom"));
        assert!(logs_contain("boom"));
    }

    #[tokio::test]
    async fn passes_results_through() {
        let h = recovery().wrap(handler::boxed(|_req: Request| async { Reply::ok("fine") }));
        let reply = h.call(Request::test(RawRequest::get("/"))).await;
        assert!(reply.error().is_none());
    }

    #[test]
    fn formats_non_string_payloads() {
        assert_eq!(panic_message(&42_u8), "unknown panic");
        assert_eq!(panic_message(&String::from("owned")), "owned");
    }
}
