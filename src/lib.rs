//! # switchyard
//!
//! The request-dispatch core of a small HTTP server: every registered route
//! is assembled into one pipeline that decodes the request, bounds the
//! handler's running time, recovers from panics, buffers the response so it
//! can still be rewritten, optionally gzips it, and only then lets it reach
//! the connection. Around that sits a hyper/tokio server with an orderly,
//! idempotent shutdown.
//!
//! ## Layers
//!
//! ```text
//!              ┌────────────── transforms (raw bytes) ──────────────┐
//! connection → │ your transforms → capture → gzip → dispatch        │
//!              └───────────────────────────────────┬────────────────┘
//!                                                  │ decoded Request
//!              ┌──────────── middlewares (typed) ──▼────────────────┐
//!              │ recovery → timeout → your middlewares → handler    │
//!              └────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use serde::Deserialize;
//! use switchyard::{Config, Error, HttpError, Payload, Request, Router, Server};
//!
//! #[derive(Deserialize)]
//! struct NewUser { name: String }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let config = Config::default()
//!         .with_request_timeout(Duration::from_secs(5))
//!         .with_gzip(6);
//!
//!     let app = Router::with_config(&config)
//!         .get("/users/{id}", get_user)
//!         .post("/users", create_user);
//!
//!     Server::from_config(&config).serve(app).await
//! }
//!
//! async fn get_user(req: Request) -> Result<Payload, Error> {
//!     match req.param("id") {
//!         Some("1") => Payload::json(&serde_json::json!({ "id": 1, "name": "alice" })),
//!         _ => Err(HttpError::not_found("no such user").into()),
//!     }
//! }
//!
//! async fn create_user(req: Request) -> Result<String, Error> {
//!     let user: NewUser = req.decode()?;
//!     Ok(format!("created {}", user.name))
//! }
//! ```

mod codec;
mod config;
mod error;
mod reply;
mod request;
mod route;
mod router;
mod server;
mod writer;

pub mod handler;
pub mod health;
pub mod middleware;
pub mod transform;

pub use codec::{Decoder, Encoder, ErrorHandler, FormDecoder, JsonEncoder, PlainErrorHandler};
pub use config::{Config, CorsConfig, GzipConfig};
pub use error::{CustomError, Error, HasStatus, HttpError, Result};
pub use handler::{BoxedHandler, ErasedHandler, Handler};
pub use http::{Method, StatusCode};
pub use middleware::Middleware;
pub use reply::{ContentType, IntoReply, Payload, Reply};
pub use request::{Params, RawRequest, Request};
pub use route::{Pipeline, Route, RouteOptions};
pub use router::{Group, Router};
pub use server::{Server, ServerHandle, ServerState};
pub use transform::Transform;
pub use writer::{ResponseWriter, Transport, WriteResponse, forbids_body};
