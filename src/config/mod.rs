//! Configuration management for fetchd
//!
//! This module provides a layered configuration system that loads settings
//! from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the
//! pattern `FETCHD__<section>__<key>`:
//!
//! - `FETCHD__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `FETCHD__FETCH__WORKERS=8`
//! - `FETCHD__FETCH__HOST_CONCURRENCY=4`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/fetchd.toml`.
//! This can be overridden using the `FETCHD_CONFIG` environment variable.

mod models;
mod sources;

pub use models::{Config, FetchConfig, ServerConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),
}

impl Config {
    /// Load configuration from all sources (file + environment).
    pub fn load() -> Result<Self, ConfigError> {
        Ok(sources::load()?)
    }

    /// Load configuration from a specific path.
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        Ok(sources::load_from_sources(path)?)
    }
}
