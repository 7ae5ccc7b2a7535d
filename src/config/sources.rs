use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "MEDIAFETCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/mediafetch.toml";
const ENV_PREFIX: &str = "MEDIAFETCH";
const ENV_SEPARATOR: &str = "__";
const ENV_LIST_KEYS: [&str; 4] = [
    "discovery.media_extensions",
    "discovery.page_keywords",
    "discovery.render_hosts",
    "swarm.media_extensions",
];

/// Path of the TOML file: `MEDIAFETCH_CONFIG` or the default location
pub fn default_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration with priority (lowest to highest):
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables
pub fn load() -> Result<Config, ConfigError> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    load_from_sources(default_path())
}

/// Load configuration from a specific path plus environment overrides
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::debug!(path = %config_path.display(), "Loading configuration file");
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::debug!(
            path = %config_path.display(),
            "Configuration file not found, using defaults and environment overrides"
        );
    }

    // MEDIAFETCH__WORKER__CONCURRENCY -> worker.concurrency
    let mut environment = Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .list_separator(",")
        .try_parsing(true);
    for key in ENV_LIST_KEYS {
        environment = environment.with_list_parse_key(key);
    }
    builder = builder.add_source(environment);

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.worker.concurrency, 3);
        assert_eq!(config.extractor.program, "yt-dlp");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[output]
root = "/srv/music"

[worker]
concurrency = 2

[http]
read_timeout = "2m"
max_download_size = "1GB"

[discovery]
render_hosts = ["example.com"]
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.output.root, PathBuf::from("/srv/music"));
        assert_eq!(config.worker.concurrency, 2);
        assert_eq!(config.http.read_timeout.as_duration(), Duration::from_secs(120));
        assert_eq!(
            config.http.max_download_size.map(|s| s.as_u64()),
            Some(1 << 30)
        );
        assert_eq!(config.discovery.render_hosts, vec!["example.com"]);
        assert_eq!(config.discovery.page_keywords.len(), 4);
    }

    #[test]
    fn test_backend_tables() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[backends.soundcloud]
audio_quality = 256
referer = "https://soundcloud.com/discover"

[backends.direct.headers]
Authorization = "Bearer token"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends["soundcloud"].audio_quality, Some(256));
        assert_eq!(
            config.backends["direct"].headers.get("Authorization").map(String::as_str),
            Some("Bearer token")
        );
    }
}
