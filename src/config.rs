//! Configuration.
//!
//! A [`Config`] can be parsed from TOML or built in code. Durations use
//! humantime syntax (`"250ms"`, `"30s"`, `"1h"`):
//!
//! ```toml
//! listen = "0.0.0.0:8080"
//! diagnostics = "127.0.0.1:9090"
//! request_timeout = "5s"
//! shutdown_timeout = "30s"
//! recovery = true
//!
//! [gzip]
//! enabled = true
//! level = 6
//!
//! [cors]
//! allow_origins = ["https://*.example.com"]
//! allow_methods = ["GET", "POST"]
//! allow_credentials = true
//! max_age = "1h"
//! ```
//!
//! The server half (`listen`, `diagnostics`, `shutdown_timeout`) is read by
//! [`Server::from_config`](crate::Server::from_config); the rest becomes
//! route defaults through [`Router::with_config`](crate::Router::with_config).

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address of the main listener.
    pub listen: SocketAddr,

    /// Address of the health-check listener. Disabled when absent.
    pub diagnostics: Option<SocketAddr>,

    /// Default per-route time budget. No guard when absent.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,

    /// How long in-flight connections may drain once shutdown starts.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Recover from handler panics.
    pub recovery: bool,

    pub gzip: GzipConfig,

    pub cors: Option<CorsConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            diagnostics: None,
            request_timeout: None,
            shutdown_timeout: Duration::from_secs(30),
            recovery: true,
            gzip: GzipConfig::default(),
            cors: None,
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn with_listen(mut self, addr: SocketAddr) -> Self {
        self.listen = addr;
        self
    }

    pub fn with_diagnostics(mut self, addr: SocketAddr) -> Self {
        self.diagnostics = Some(addr);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_recovery(mut self, enabled: bool) -> Self {
        self.recovery = enabled;
        self
    }

    /// Enables gzip at `level` (0–9, `-1` for the default level).
    pub fn with_gzip(mut self, level: i32) -> Self {
        self.gzip = GzipConfig { enabled: true, level };
        self
    }

    pub fn with_cors(mut self, cors: CorsConfig) -> Self {
        self.cors = Some(cors);
        self
    }
}

// ── Gzip ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GzipConfig {
    pub enabled: bool,
    /// Compression level 0–9. Anything else, including the default `-1`,
    /// uses the library's default level.
    pub level: i32,
}

impl Default for GzipConfig {
    fn default() -> Self {
        Self { enabled: false, level: -1 }
    }
}

// ── CORS ──────────────────────────────────────────────────────────────────────

/// Cross-Origin Resource Sharing policy.
///
/// `allow_origins` entries may be exact origins, `*`, subdomain wildcards
/// (`https://*.example.com`) or glob patterns using `*` and `?`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    /// Headers allowed on preflight. When empty, the requested headers are
    /// echoed back.
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
    #[serde(with = "humantime_serde")]
    pub max_age: Option<Duration>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_owned()],
            allow_methods: ["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE"]
                .map(str::to_owned)
                .to_vec(),
            allow_headers: Vec::new(),
            allow_credentials: false,
            max_age: None,
        }
    }
}

impl CorsConfig {
    pub fn with_allow_origins<S: Into<String>>(mut self, origins: impl IntoIterator<Item = S>) -> Self {
        self.allow_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allow_headers<S: Into<String>>(mut self, headers: impl IntoIterator<Item = S>) -> Self {
        self.allow_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allow_credentials(mut self) -> Self {
        self.allow_credentials = true;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }
}
