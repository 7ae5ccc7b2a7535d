//! Configuration management for mediafetch
//!
//! Settings are layered from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use mediafetch::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Output root: {}", config.output.root.display());
//! ```
//!
//! # Environment Variables
//!
//! Any value can be overridden with `MEDIAFETCH__<section>__<key>`:
//! - `MEDIAFETCH__WORKER__CONCURRENCY=8`
//! - `MEDIAFETCH__OUTPUT__ROOT=/srv/music`
//! - `MEDIAFETCH__HTTP__MAX_DOWNLOAD_SIZE=2GB`
//! - `MEDIAFETCH__DISCOVERY__MEDIA_EXTENSIONS=.mp3,.ogg`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/mediafetch.toml`.
//! This can be overridden using the `MEDIAFETCH_CONFIG` environment variable.

mod models;
mod resolver;
mod sources;
mod validation;

pub use crate::humanize::{ByteSize, HumanDuration};
pub use models::{
    BackendConfig, BackendOverrides, Config, DiscoveryConfig, ExtractorConfig, HttpConfig,
    OutputConfig, SwarmConfig, WorkerConfig,
};
pub use resolver::BackendResolver;
pub use validation::{MAX_AUDIO_QUALITY, MAX_CONCURRENCY, ValidationError, validate_concurrency};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to render configuration: {0}")]
    RenderError(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path plus environment overrides
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Re-run validation after programmatic changes (CLI overrides)
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self).map_err(ConfigError::from)
    }

    /// Per-source backend settings for this configuration
    pub fn backend_resolver(&self) -> BackendResolver<'_> {
        BackendResolver::new(self)
    }

    /// Effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
