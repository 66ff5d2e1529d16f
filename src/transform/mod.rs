//! Transport-level transforms.
//!
//! A transform wraps the *raw* route handler: it sees the undecoded request
//! and the writer that eventually reaches the socket, never the handler's
//! typed result. Transforms compose outermost-registered-first: with
//! `[a, b]` configured, a request runs `a → b → core → b → a`.
//!
//! Every route gets two built-in transforms around its core dispatch:
//!
//! ```text
//! user transforms … → capture → gzip (if enabled) → core dispatch
//!                        │          │
//!                        │          └ compresses into the capture buffer
//!                        └ buffers status + body, commits on close
//! ```
//!
//! Capture therefore sits closest to the transport writer and compression
//! directly inside it, so compression always works on a fully buffered body
//! and can fix up `content-encoding`/`content-length` before the status line
//! is committed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::RawRequest;
use crate::writer::ResponseWriter;

mod capture;
mod gzip;
mod trace;

pub use capture::{ResponseCapture, capture};
pub use gzip::{Gzip, GzipWriter, accepts_gzip};
pub use trace::trace;

/// Future returned by a [`RawHandler`]. Borrows the writer for `'a`.
pub type RawFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// A handler at the transport level: writes a response for a raw request.
pub trait RawHandler: Send + Sync + 'static {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: RawRequest) -> RawFuture<'a>;
}

/// A shared, type-erased raw handler.
pub type BoxedRawHandler = Arc<dyn RawHandler>;

/// Wraps a raw handler in another raw handler.
pub trait Transform: Send + Sync + 'static {
    fn wrap(&self, next: BoxedRawHandler) -> BoxedRawHandler;
}

impl<F> Transform for F
where
    F: Fn(BoxedRawHandler) -> BoxedRawHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedRawHandler) -> BoxedRawHandler {
        self(next)
    }
}

/// Applies `transforms` around `core`, first entry outermost.
pub(crate) fn chain(transforms: &[Arc<dyn Transform>], core: BoxedRawHandler) -> BoxedRawHandler {
    transforms.iter().rev().fold(core, |next, t| t.wrap(next))
}
