//! Configuration loading
//!
//! Handles loading configuration from embedded defaults, files, and environment.

use super::config::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::path::Path;

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SWITCHYARD";

/// Load configuration from `config/` and the process environment
pub fn load_config() -> Result<AppConfig> {
    let profile = std::env::var("SWITCHYARD_ENV").unwrap_or_else(|_| "development".to_string());
    load_config_from(Path::new("config"), &profile, None)
}

/// Load configuration from `dir`
///
/// `env` replaces the process environment when given.
pub fn load_config_from(
    dir: &Path,
    profile: &str,
    env: Option<HashMap<String, String>>,
) -> Result<AppConfig> {
    let file = |name: &str| File::from(dir.join(name)).required(false);

    let config = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. External overrides (optional)
        .add_source(file("default"))
        .add_source(file(profile))
        .add_source(file("local"))
        // 3. Environment variables (highest priority)
        // SWITCHYARD_PROVIDERS__DEEPSEEK__API_KEY -> providers.deepseek.api_key
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}
