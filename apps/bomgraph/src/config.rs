//! # Configuration
//!
//! Layered settings: TOML file, then environment variables, then CLI flags
//! (applied by the caller).
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! rate_limit = 100
//! cors_origins = ["http://localhost:3000"]
//!
//! [traversal]
//! max_depth = 100
//! max_nodes = 100000
//! ```
//!
//! ## Environment Variables
//!
//! - `BOMGRAPH_API_KEY`: bearer token required on every endpoint but `/health`
//! - `BOMGRAPH_RATE_LIMIT`: requests per second, 0 disables
//! - `BOMGRAPH_CORS_ORIGINS`: comma-separated origins, or `*`
//! - `BOMGRAPH_MAX_DEPTH`, `BOMGRAPH_MAX_NODES`: traversal bounds

use bomgraph_core::{BomError, TraversalOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Used when `--config` is not given and the file exists.
pub const DEFAULT_CONFIG_FILE: &str = "bomgraph.toml";

/// Default rate limit in requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Upper bound on the configurable traversal depth.
pub const MAX_CONFIGURED_DEPTH: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Requests per second, 0 disables limiting.
    pub rate_limit: u32,
    /// `None` means localhost only. A single `"*"` allows every origin.
    pub cors_origins: Option<Vec<String>>,
    /// Only ever read from the environment.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            rate_limit: DEFAULT_RATE_LIMIT,
            cors_origins: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    pub max_depth: usize,
    pub max_nodes: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        let options = TraversalOptions::default();
        Self {
            max_depth: options.max_depth,
            max_nodes: options.max_nodes,
        }
    }
}

impl TraversalConfig {
    #[must_use]
    pub fn options(&self) -> TraversalOptions {
        TraversalOptions::default()
            .with_max_depth(self.max_depth)
            .with_max_nodes(self.max_nodes)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub traversal: TraversalConfig,
}

impl AppConfig {
    /// Read `path`, or `bomgraph.toml` when present, then apply the
    /// environment. An explicit path that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, BomError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, BomError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BomError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, BomError> {
        toml::from_str(text).map_err(|e| BomError::InvalidInput(format!("config: {}", e)))
    }

    /// Override settings from environment variables. Unparsable numbers
    /// are ignored with a warning.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("BOMGRAPH_API_KEY").filter(|k| !k.is_empty()) {
            self.server.api_key = Some(key);
        }
        if let Some(limit) = parse_var(&var, "BOMGRAPH_RATE_LIMIT") {
            self.server.rate_limit = limit;
        }
        if let Some(origins) = var("BOMGRAPH_CORS_ORIGINS") {
            self.server.cors_origins = Some(
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }
        if let Some(depth) = parse_var(&var, "BOMGRAPH_MAX_DEPTH") {
            self.traversal.max_depth = depth;
        }
        if let Some(nodes) = parse_var(&var, "BOMGRAPH_MAX_NODES") {
            self.traversal.max_nodes = nodes;
        }
    }

    pub fn validate(&self) -> Result<(), BomError> {
        if self.traversal.max_depth > MAX_CONFIGURED_DEPTH {
            return Err(BomError::InvalidInput(format!(
                "max_depth {} exceeds {}",
                self.traversal.max_depth, MAX_CONFIGURED_DEPTH
            )));
        }
        if self.traversal.max_nodes == 0 {
            return Err(BomError::InvalidInput(
                "max_nodes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = key, value = %raw, "Ignoring unparsable environment value");
            None
        }
    }
}
