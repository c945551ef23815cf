//! Application settings: the datasource graph, search templates, pseudo-columns
//! and the HTTP listener.
//!
//! Settings are read from a file (any format the `config` crate knows, TOML
//! by default) and may be overridden by `TRIBUTARY__*` environment variables,
//! e.g. `TRIBUTARY__SERVER__BIND=0.0.0.0:9000`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::Result;
use crate::registry::SourceDesc;
use crate::search::SearchDesc;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_CONFIG_PATH: &str = "tributary.toml";
pub const ENV_PREFIX: &str = "TRIBUTARY";

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// A pseudo-column computed from a `${column}` template.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TransformDesc {
    #[serde(alias = "COLUMN")]
    pub column: String,
    #[serde(alias = "TEMPLATE")]
    pub template: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    /// Upper bound for a single datasource access, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// The datasource graph, in construction order.
    #[serde(default)]
    pub datasource: Vec<SourceDesc>,
    #[serde(default)]
    pub search: Vec<SearchDesc>,
    #[serde(default)]
    pub transform: Vec<TransformDesc>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            datasource: Vec::new(),
            search: Vec::new(),
            transform: Vec::new(),
        }
    }
}

fn default_bind() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl AppConfig {
    /// Reads `path` if it exists, then applies environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let builder = ::config::Config::builder();
        let builder = if Path::new(path).exists() {
            builder.add_source(::config::File::with_name(path))
        } else {
            warn!(path, "configuration file not found, using defaults");
            builder
        };
        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from_str(text, ::config::FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_settings() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert_eq!(config.server.bind, DEFAULT_BIND_ADDR);
        assert!(config.datasource.is_empty());
    }
}
