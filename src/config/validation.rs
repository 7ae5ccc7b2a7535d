use super::models::Config;
use crate::source::SourceType;
use std::time::Duration;
use thiserror::Error;

pub const MAX_CONCURRENCY: usize = 16;
pub const MAX_AUDIO_QUALITY: u32 = 320;
const MAX_SWARM_CONNECTIONS: u32 = 16;
const MAX_SWARM_PEERS: u32 = 500;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("worker.concurrency must be between 1 and 16, got {0}")]
    InvalidConcurrency(usize),

    #[error("{field} = {value} exceeds the maximum audio quality of 320 kbps")]
    AudioQualityOutOfRange { field: String, value: u32 },

    #[error("{field} entry '{value}' must start with '.'")]
    InvalidExtension { field: &'static str, value: String },

    #[error("Unknown backend table '[backends.{0}]'")]
    UnknownBackendKey(String),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("{field} must be between 1 and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },

    #[error("{0} must not be empty")]
    EmptyProgram(&'static str),

    #[error("output.staging_dir '{0}' must be a single relative path component")]
    InvalidStagingDir(String),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_worker(config)?;
    validate_timeouts(config)?;
    validate_output(config)?;
    validate_extensions(config)?;
    validate_extractor(config)?;
    validate_swarm(config)?;
    validate_backends(config)?;
    Ok(())
}

pub fn validate_concurrency(concurrency: usize) -> Result<(), ValidationError> {
    if concurrency == 0 || concurrency > MAX_CONCURRENCY {
        return Err(ValidationError::InvalidConcurrency(concurrency));
    }
    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    validate_concurrency(config.worker.concurrency)
}

fn validate_timeouts(config: &Config) -> Result<(), ValidationError> {
    let timeouts = [
        ("http.connect_timeout", config.http.connect_timeout.as_duration()),
        ("http.read_timeout", config.http.read_timeout.as_duration()),
        ("discovery.render_timeout", config.discovery.render_timeout.as_duration()),
        ("extractor.timeout", config.extractor.timeout.as_duration()),
        ("swarm.timeout", config.swarm.timeout.as_duration()),
    ];

    for (field, value) in timeouts {
        if value == Duration::ZERO {
            return Err(ValidationError::ZeroTimeout(field));
        }
    }

    Ok(())
}

fn validate_output(config: &Config) -> Result<(), ValidationError> {
    let staging = &config.output.staging_dir;
    if staging.is_empty() || staging == "." || staging == ".." || staging.contains(['/', '\\']) {
        return Err(ValidationError::InvalidStagingDir(staging.clone()));
    }
    Ok(())
}

fn validate_extensions(config: &Config) -> Result<(), ValidationError> {
    let lists = [
        ("discovery.media_extensions", &config.discovery.media_extensions),
        ("swarm.media_extensions", &config.swarm.media_extensions),
    ];

    for (field, extensions) in lists {
        if let Some(bad) = extensions.iter().find(|ext| !ext.starts_with('.') || ext.len() < 2) {
            return Err(ValidationError::InvalidExtension {
                field,
                value: bad.clone(),
            });
        }
    }

    Ok(())
}

fn validate_extractor(config: &Config) -> Result<(), ValidationError> {
    if config.extractor.program.trim().is_empty() {
        return Err(ValidationError::EmptyProgram("extractor.program"));
    }
    if config.extractor.audio_quality > MAX_AUDIO_QUALITY {
        return Err(ValidationError::AudioQualityOutOfRange {
            field: "extractor.audio_quality".to_string(),
            value: config.extractor.audio_quality,
        });
    }
    Ok(())
}

fn validate_swarm(config: &Config) -> Result<(), ValidationError> {
    if config.swarm.program.trim().is_empty() {
        return Err(ValidationError::EmptyProgram("swarm.program"));
    }

    let limits = [
        ("swarm.max_connections_per_peer", config.swarm.max_connections_per_peer),
        ("swarm.split", config.swarm.split),
    ];
    for (field, value) in limits {
        check_range(field, value, MAX_SWARM_CONNECTIONS)?;
    }
    // aria2c reads a peer cap of 0 as unlimited
    check_range("swarm.max_peers", config.swarm.max_peers, MAX_SWARM_PEERS)?;

    Ok(())
}

fn check_range(field: &'static str, value: u32, max: u32) -> Result<(), ValidationError> {
    if value == 0 || value > max {
        return Err(ValidationError::OutOfRange { field, value, max });
    }
    Ok(())
}

/// Backend tables must name a known source and carry sane values
fn validate_backends(config: &Config) -> Result<(), ValidationError> {
    for (key, overrides) in &config.backends {
        if !SourceType::config_keys().any(|known| known == key) {
            return Err(ValidationError::UnknownBackendKey(key.clone()));
        }

        if let Some(quality) = overrides.audio_quality {
            if quality > MAX_AUDIO_QUALITY {
                return Err(ValidationError::AudioQualityOutOfRange {
                    field: format!("backends.{key}.audio_quality"),
                    value: quality,
                });
            }
        }
    }

    Ok(())
}
