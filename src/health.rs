//! Built-in Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! With [`Server::diagnostics`](crate::Server::diagnostics) set, both are
//! served on a separate listener and `/readyz` turns `503` as soon as
//! shutdown begins. They can also be registered on the main router:
//!
//! ```rust
//! use switchyard::{Router, health};
//!
//! let app = Router::new()
//!     .get("/healthz", health::liveness)
//!     .get("/readyz", health::readiness);
//! ```

use http::StatusCode;

use crate::error::HttpError;
use crate::reply::Payload;
use crate::request::Request;
use crate::router::Router;
use crate::server::ServerHandle;

/// Kubernetes liveness probe handler.
///
/// Always returns `200 OK` with body `"ok"`. If the process can respond to
/// HTTP at all, it is alive.
pub async fn liveness(_req: Request) -> Payload {
    Payload::text("ok")
}

/// Kubernetes readiness probe handler (default implementation).
///
/// Returns `200 OK` with body `"ready"`.
pub async fn readiness(_req: Request) -> Payload {
    Payload::text("ready")
}

/// The diagnostics router: readiness follows the server's lifecycle.
pub(crate) fn router(handle: ServerHandle) -> Router {
    Router::new().get("/healthz", liveness).get("/readyz", move |_req: Request| {
        let shutting_down = handle.is_shutting_down();
        async move {
            if shutting_down {
                return Err(HttpError::new(StatusCode::SERVICE_UNAVAILABLE, "shutting down"));
            }
            Ok(Payload::text("ready"))
        }
    })
}
