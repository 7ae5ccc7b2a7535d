use crate::humanize::{ByteSize, HumanDuration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub swarm: SwarmConfig,
    /// Per-source overrides keyed by `SourceType::config_key`
    #[serde(default)]
    pub backends: BTreeMap<String, BackendOverrides>,
}

/// Managed output directory
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_root")]
    pub root: PathBuf,
    /// Directory under `root` holding partial downloads and work dirs
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_output_root(),
            staging_dir: default_staging_dir(),
        }
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_staging_dir() -> String {
    ".staging".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Target pipelines running at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    3
}

/// HTTP client settings shared by page fetches and direct downloads
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    /// Longest pause between two body reads
    #[serde(default = "default_read_timeout")]
    pub read_timeout: HumanDuration,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Direct downloads larger than this are aborted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_download_size: Option<ByteSize>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            max_retries: default_max_retries(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            max_download_size: None,
        }
    }
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_read_timeout() -> HumanDuration {
    HumanDuration::from_secs(60)
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_redirects() -> usize {
    10
}

fn default_user_agent() -> String {
    concat!("mediafetch/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Link discovery rules
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_link_extensions")]
    pub media_extensions: Vec<String>,
    #[serde(default = "default_page_keywords")]
    pub page_keywords: Vec<String>,
    /// Hosts whose pages are rendered in a browser before scraping
    #[serde(default)]
    pub render_hosts: Vec<String>,
    /// Readiness budget for a rendered page
    #[serde(default = "default_render_timeout")]
    pub render_timeout: HumanDuration,
    /// Browser program name or path; searched on PATH when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            media_extensions: default_link_extensions(),
            page_keywords: default_page_keywords(),
            render_hosts: Vec::new(),
            render_timeout: default_render_timeout(),
            browser: None,
        }
    }
}

fn default_link_extensions() -> Vec<String> {
    [".mp3", ".wav", ".flac", ".m4a"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_page_keywords() -> Vec<String> {
    ["/track/", "/album/", "/music/", "/song/"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_render_timeout() -> HumanDuration {
    HumanDuration::from_secs(20)
}

/// Media extraction engine
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractorConfig {
    #[serde(default = "default_extractor_program")]
    pub program: String,
    #[serde(default = "default_extractor_timeout")]
    pub timeout: HumanDuration,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_audio_format")]
    pub audio_format: String,
    /// Kbps, at most 320
    #[serde(default = "default_audio_quality")]
    pub audio_quality: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            program: default_extractor_program(),
            timeout: default_extractor_timeout(),
            format: default_format(),
            audio_format: default_audio_format(),
            audio_quality: default_audio_quality(),
        }
    }
}

fn default_extractor_program() -> String {
    "yt-dlp".to_string()
}

fn default_extractor_timeout() -> HumanDuration {
    HumanDuration::from_secs(30 * 60)
}

fn default_format() -> String {
    "bestaudio/best".to_string()
}

fn default_audio_format() -> String {
    "mp3".to_string()
}

fn default_audio_quality() -> u32 {
    192
}

/// Peer-to-peer transfer engine
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SwarmConfig {
    #[serde(default = "default_swarm_program")]
    pub program: String,
    #[serde(default = "default_swarm_timeout")]
    pub timeout: HumanDuration,
    #[serde(default = "default_connections_per_peer")]
    pub max_connections_per_peer: u32,
    #[serde(default = "default_split")]
    pub split: u32,
    /// Peer cap per transfer; must stay bounded
    #[serde(default = "default_max_peers")]
    pub max_peers: u32,
    /// Files relocated into the output root after a transfer
    #[serde(default = "default_swarm_extensions")]
    pub media_extensions: Vec<String>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            program: default_swarm_program(),
            timeout: default_swarm_timeout(),
            max_connections_per_peer: default_connections_per_peer(),
            split: default_split(),
            max_peers: default_max_peers(),
            media_extensions: default_swarm_extensions(),
        }
    }
}

fn default_swarm_program() -> String {
    "aria2c".to_string()
}

fn default_swarm_timeout() -> HumanDuration {
    HumanDuration::from_secs(2 * 60 * 60)
}

fn default_connections_per_peer() -> u32 {
    16
}

fn default_split() -> u32 {
    16
}

fn default_max_peers() -> u32 {
    55
}

fn default_swarm_extensions() -> Vec<String> {
    [".mp3", ".flac", ".wav", ".m4a", ".ogg", ".opus", ".aac", ".alac", ".aiff"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Optional per-source settings layered over the built-in defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BackendOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_quality: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_errors: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_thumbnail: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flat_playlist: Option<bool>,
}

/// Settings handed to a backend for one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub format: String,
    pub audio_format: String,
    pub audio_quality: u32,
    pub headers: BTreeMap<String, String>,
    pub referer: Option<String>,
    pub max_retries: u32,
    pub ignore_errors: bool,
    pub write_thumbnail: bool,
    pub flat_playlist: bool,
}

impl BackendConfig {
    /// Request headers including the referer
    pub fn request_headers(&self) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if let Some(referer) = &self.referer {
            if !self.headers.keys().any(|k| k.eq_ignore_ascii_case("referer")) {
                headers.push(("Referer".to_string(), referer.clone()));
            }
        }
        headers
    }
}
