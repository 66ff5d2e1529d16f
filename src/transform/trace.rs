//! Access log.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use super::{BoxedRawHandler, RawFuture, RawHandler, Transform};
use crate::request::RawRequest;
use crate::writer::ResponseWriter;

/// One `info!` event per request: method, path, committed status, latency.
///
/// Register it as a route or router transform. It sits outside the response
/// capture, so the status it logs is the one that actually went out.
pub fn trace() -> impl Transform {
    |next: BoxedRawHandler| -> BoxedRawHandler { Arc::new(Trace { next }) }
}

struct Trace {
    next: BoxedRawHandler,
}

impl RawHandler for Trace {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: RawRequest) -> RawFuture<'a> {
        Box::pin(async move {
            let method = req.method().clone();
            let path = req.uri().path().to_owned();
            let started = Instant::now();

            self.next.serve(&mut *w, req).await;

            info!(
                %method,
                path,
                status = w.status().map(|s| s.as_u16()),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "request"
            );
        })
    }
}
