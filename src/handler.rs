//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! A route holds exactly one business handler, but middlewares wrap it in
//! handlers of *other* concrete types, and every route in the router has a
//! different one. So everything is stored behind a trait object
//! (`dyn ErasedHandler`) and shared through an `Arc`.
//!
//! The chain from user code to vtable call is:
//!
//! ```text
//! async fn hello(req: Request) -> Result<Payload, Error> { … }  ← user writes this
//!        ↓ router.get("/", hello)
//! hello.into_boxed_handler()                                  ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                                  ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! middleware.wrap(handler)                                    ← once, at route build time
//!        ↓
//! handler.call(req)  at request time                          ← one vtable dispatch per layer
//!        ↓
//! Box::pin(async { hello(req).await.into_reply() })           ← BoxFuture
//! ```
//!
//! The future is `'static` and owns its [`Request`], which is what lets the
//! timeout guard move a call onto a detached worker task.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::reply::{IntoReply, Reply};
use crate::request::Request;

/// A heap-allocated, type-erased future that resolves to a [`Reply`].
///
/// `Send + 'static` let tokio move the future across threads and onto
/// detached worker tasks.
pub type BoxFuture = Pin<Box<dyn Future<Output = Reply> + Send + 'static>>;

/// Dispatch interface shared by business handlers and middleware layers.
///
/// Middlewares implement this for their wrapper type and call `next.call`
/// to continue the chain.
pub trait ErasedHandler: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A heap-allocated, type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn ErasedHandler>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` (or closure returning a future) with the signature:
///
/// ```text
/// async fn name(req: Request) -> impl IntoReply
/// ```
///
/// The trait is **sealed** (via the private `Sealed` supertrait): only the
/// blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Boxes a handler function, e.g. to build the `next` of a hand-written
/// middleware or to call a handler outside a router.
pub fn boxed(handler: impl Handler) -> BoxedHandler {
    handler.into_boxed_handler()
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Newtype bridging a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_reply() })
    }
}
