//! Minimal switchyard example: JSON endpoints, a slow route behind the
//! timeout guard, a panicking route behind recovery, gzip and health checks.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic [config.toml]
//!
//! Try:
//!   curl http://localhost:3000/api/users/1
//!   curl -X POST http://localhost:3000/api/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X DELETE http://localhost:3000/api/users/1
//!   curl http://localhost:3000/slow          # 408 after 1 s
//!   curl http://localhost:3000/boom          # 500, panic in the log
//!   curl --compressed -v http://localhost:3000/api/users/1
//!   curl http://localhost:9000/readyz

use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchyard::{
    Config, CorsConfig, Error, HttpError, Payload, Request, ResponseWriter, Router, Server,
    StatusCode, WriteResponse, transform,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default()
            .with_listen(([0, 0, 0, 0], 3000).into())
            .with_diagnostics(([127, 0, 0, 1], 9000).into())
            .with_request_timeout(Duration::from_secs(1))
            .with_shutdown_timeout(Duration::from_secs(10))
            .with_gzip(6)
            .with_cors(CorsConfig::default()),
    };

    let app = Router::with_config(&config)
        .transform(transform::trace())
        .group("/api", |api| {
            api.get("/users/{id}", get_user)
                .post("/users", create_user)
                .delete("/users/{id}", delete_user)
        })
        .get("/slow", slow)
        .get("/boom", boom);

    Server::from_config(&config).serve(app).await
}

#[derive(Serialize)]
struct User {
    id: u64,
    name: String,
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

// GET /api/users/{id}
async fn get_user(req: Request) -> Result<Payload, Error> {
    let id: u64 = req
        .param("id")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| HttpError::bad_request("id must be a number"))?;

    if id != 1 {
        return Err(HttpError::not_found(format!("no user {id}")).into());
    }
    Payload::json(&User { id, name: "alice".into() })
}

// POST /api/users → 201 with a location header
async fn create_user(req: Request) -> Result<Payload, Error> {
    let input: NewUser = req.decode()?;
    Ok(Payload::custom(Created(User { id: 99, name: input.name })))
}

// DELETE /api/users/{id} → 204 No Content
async fn delete_user(_req: Request) {}

async fn slow(_req: Request) -> &'static str {
    tokio::time::sleep(Duration::from_secs(3)).await;
    "too late"
}

async fn boom(_req: Request) -> &'static str {
    panic!("boom")
}

/// A payload that picks its own status line.
struct Created(User);

impl WriteResponse for Created {
    fn write_to(&self, w: &mut dyn ResponseWriter) -> io::Result<()> {
        let body = serde_json::to_vec(&self.0)?;
        let location = format!("/api/users/{}", self.0.id);
        w.headers_mut().insert("content-type", "application/json".parse().map_err(io::Error::other)?);
        w.headers_mut().insert("location", location.parse().map_err(io::Error::other)?);
        w.set_status(StatusCode::CREATED);
        w.write(&body)?;
        Ok(())
    }
}
