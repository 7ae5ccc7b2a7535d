//! Direct-Fetch: stream a plain HTTP resource into the output root

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

use super::registry::BackendKind;
use super::traits::{AcquireContext, Acquired, Backend};
use crate::config::BackendConfig;
use crate::error::Result;
use crate::output::sanitize_file_name;
use crate::target::AcquisitionTarget;
use crate::worker::http::{DownloadMeta, HttpClient};

static EXTENDED_FILENAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)filename\*\s*=\s*([^']*)'[^']*'([^;\s]+)"#).ok());
static QUOTED_FILENAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)filename\s*=\s*"([^"]*)""#).ok());
static BARE_FILENAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)filename\s*=\s*([^;"\s]+)"#).ok());

pub struct DirectFetch {
    http: HttpClient,
}

impl DirectFetch {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Backend for DirectFetch {
    fn kind(&self) -> BackendKind {
        BackendKind::DirectFetch
    }

    async fn acquire(
        &self,
        target: &AcquisitionTarget,
        config: &BackendConfig,
        ctx: &AcquireContext,
    ) -> Result<Acquired> {
        let partial = ctx.output.partial_file()?;
        let http = self.http.with_max_retries(config.max_retries);

        debug!(url = %target.url, partial = %partial.display(), "Streaming to staging file");
        let meta = http
            .download_to(&target.url, &config.request_headers(), &partial, &ctx.cancel)
            .await?;

        let name = file_name_for(&target.url, &meta);
        let path = ctx.output.place(partial, &name)?;

        info!(url = %target.url, path = %path.display(), bytes = meta.bytes, "Direct download complete");
        Ok(Acquired::single(path))
    }
}

/// URL path segment, then Content-Disposition, then a generated name
pub fn file_name_for(url: &str, meta: &DownloadMeta) -> String {
    url_file_name(url)
        .or_else(|| {
            meta.content_disposition
                .as_deref()
                .and_then(disposition_file_name)
        })
        .unwrap_or_else(|| generated_name(meta.content_type.as_deref()))
}

/// Last path segment, percent-decoded
pub fn url_file_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    sanitize_file_name(&decoded)
}

/// `filename*=` wins over `filename=`
pub fn disposition_file_name(header: &str) -> Option<String> {
    let extended = capture(&EXTENDED_FILENAME, header, 2)
        .and_then(|raw| urlencoding::decode(raw).ok().map(|s| s.into_owned()));

    let name = extended.or_else(|| {
        capture(&QUOTED_FILENAME, header, 1)
            .or_else(|| capture(&BARE_FILENAME, header, 1))
            .map(str::to_string)
    })?;

    sanitize_file_name(&name)
}

fn capture<'h>(pattern: &LazyLock<Option<Regex>>, haystack: &'h str, group: usize) -> Option<&'h str> {
    let regex: &Regex = Option::as_ref(&**pattern)?;
    regex
        .captures(haystack)
        .and_then(|caps| caps.get(group))
        .map(|m| m.as_str())
}

pub fn generated_name(content_type: Option<&str>) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("download-{}.{}", &id[..12], extension_for(content_type))
}

/// File extension for a Content-Type, `bin` when unknown
pub fn extension_for(content_type: Option<&str>) -> &'static str {
    let Some(parsed) = content_type.and_then(|ct| ct.parse::<mime::Mime>().ok()) else {
        return "bin";
    };

    let kind = parsed.type_().as_str().to_ascii_lowercase();
    let subtype = parsed.subtype().as_str().to_ascii_lowercase();
    match (kind.as_str(), subtype.as_str()) {
        ("audio", "mpeg" | "mp3" | "mpeg3" | "x-mpeg") => "mp3",
        ("audio", "flac" | "x-flac") => "flac",
        ("audio", "wav" | "wave" | "x-wav" | "vnd.wave") => "wav",
        ("audio", "mp4" | "x-m4a" | "m4a") => "m4a",
        ("audio", "ogg" | "vorbis") => "ogg",
        ("audio", "opus") => "opus",
        ("audio", "aac" | "x-aac") => "aac",
        ("audio", "aiff" | "x-aiff") => "aiff",
        ("video", "mp4") => "mp4",
        ("video", "webm") | ("audio", "webm") => "webm",
        ("application", "zip") => "zip",
        ("application", "x-bittorrent") => "torrent",
        ("application", "pdf") => "pdf",
        ("text", "html") => "html",
        ("text", "plain") => "txt",
        _ => "bin",
    }
}
