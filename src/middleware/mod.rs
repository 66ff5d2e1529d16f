//! Middleware layer.
//!
//! A middleware wraps the *semantic* handler: it receives the decoded
//! [`Request`](crate::Request) and returns a [`Reply`](crate::Reply), before
//! anything is encoded. Composition mirrors transforms: the last registered
//! middleware is innermost, closest to the business handler.
//!
//! Every route assembles its chain as
//!
//! ```text
//! recovery → timeout → your middlewares… → handler
//! ```
//!
//! where recovery and the timeout guard are present only when enabled for
//! the route.

use std::sync::Arc;

use crate::handler::BoxedHandler;

mod cors;
mod recovery;
mod timeout;

pub use cors::{Cors, cors};
pub use recovery::{Recovery, recovery};
pub use timeout::{Timeout, timeout};

/// Wraps a handler in another handler.
///
/// Implemented for any `Fn(BoxedHandler) -> BoxedHandler`:
///
/// ```rust
/// use std::sync::Arc;
/// use switchyard::{BoxedHandler, ErasedHandler, HttpError, Reply, Request, handler};
///
/// fn require_token(next: BoxedHandler) -> BoxedHandler {
///     handler::boxed(move |req: Request| {
///         let next = Arc::clone(&next);
///         async move {
///             if req.header("authorization").is_none() {
///                 return Reply::err(HttpError::forbidden("missing token"));
///             }
///             next.call(req).await
///         }
///     })
/// }
/// ```
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self(next)
    }
}

/// Applies `middlewares` around `handler`, first entry outermost.
pub(crate) fn chain(middlewares: &[Arc<dyn Middleware>], handler: BoxedHandler) -> BoxedHandler {
    middlewares.iter().rev().fold(handler, |next, m| m.wrap(next))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::handler::{self, ErasedHandler};
    use crate::reply::Reply;
    use crate::request::{RawRequest, Request};

    fn tag(name: &'static str, seen: Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn Middleware> {
        Arc::new(move |next: BoxedHandler| -> BoxedHandler {
            let seen = Arc::clone(&seen);
            handler::boxed(move |req: Request| {
                seen.lock().unwrap().push(name);
                next.call(req)
            })
        })
    }

    #[tokio::test]
    async fn last_registered_runs_closest_to_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let inner = Arc::clone(&seen);
        let core = handler::boxed(move |_req: Request| {
            inner.lock().unwrap().push("handler");
            async { Reply::ok("done") }
        });

        let chained = chain(&[tag("outer", Arc::clone(&seen)), tag("inner", Arc::clone(&seen))], core);
        chained.call(Request::test(RawRequest::get("/"))).await;

        assert_eq!(*seen.lock().unwrap(), ["outer", "inner", "handler"]);
    }
}
