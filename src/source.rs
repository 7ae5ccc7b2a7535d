//! Source classification: which acquisition strategy a URL calls for

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// Known page-hosted media site families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteFamily {
    SoundCloud,
    Bandcamp,
    #[serde(rename = "archive")]
    InternetArchive,
    YouTube,
    Mixcloud,
}

impl SiteFamily {
    pub const ALL: [SiteFamily; 5] = [
        SiteFamily::SoundCloud,
        SiteFamily::Bandcamp,
        SiteFamily::InternetArchive,
        SiteFamily::YouTube,
        SiteFamily::Mixcloud,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SoundCloud => "soundcloud",
            Self::Bandcamp => "bandcamp",
            Self::InternetArchive => "archive",
            Self::YouTube => "youtube",
            Self::Mixcloud => "mixcloud",
        }
    }

    /// Registrable domains served by this family
    pub fn domains(&self) -> &'static [&'static str] {
        match self {
            Self::SoundCloud => &["soundcloud.com", "snd.sc"],
            Self::Bandcamp => &["bandcamp.com"],
            Self::InternetArchive => &["archive.org"],
            Self::YouTube => &["youtube.com", "youtu.be"],
            Self::Mixcloud => &["mixcloud.com"],
        }
    }

    /// Item pages link their files instead of embedding them
    pub fn requires_crawl(&self) -> bool {
        matches!(self, Self::InternetArchive)
    }

    /// Anchors only exist after client-side rendering
    pub fn requires_render(&self) -> bool {
        matches!(self, Self::SoundCloud | Self::Mixcloud)
    }

    fn matches_host(&self, host: &str) -> bool {
        self.domains().iter().any(|domain| host_within(host, domain))
    }
}

impl fmt::Display for SiteFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acquisition intent for a target URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "family")]
pub enum SourceType {
    #[default]
    AutoDetect,
    SwarmTransfer,
    PageHostedMedia(SiteFamily),
    DirectFile,
}

impl SourceType {
    /// Concrete type for `url`; explicit types are kept as given
    pub fn resolve(self, url: &str) -> SourceType {
        match self {
            SourceType::AutoDetect => classify(url),
            other => other,
        }
    }

    pub fn family(&self) -> Option<SiteFamily> {
        match self {
            SourceType::PageHostedMedia(family) => Some(*family),
            _ => None,
        }
    }

    pub fn requires_crawl(&self) -> bool {
        self.family().is_some_and(|f| f.requires_crawl())
    }

    pub fn requires_render(&self) -> bool {
        self.family().is_some_and(|f| f.requires_render())
    }

    /// Name of the `[backends.<key>]` configuration table
    pub fn config_key(&self) -> &'static str {
        match self {
            SourceType::AutoDetect => "auto",
            SourceType::SwarmTransfer => "swarm",
            SourceType::DirectFile => "direct",
            SourceType::PageHostedMedia(family) => family.as_str(),
        }
    }

    /// Every key accepted under `[backends]`
    pub fn config_keys() -> impl Iterator<Item = &'static str> {
        ["swarm", "direct"]
            .into_iter()
            .chain(SiteFamily::ALL.iter().map(|f| f.as_str()))
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::AutoDetect => f.write_str("auto"),
            SourceType::SwarmTransfer => f.write_str("swarm"),
            SourceType::DirectFile => f.write_str("direct"),
            SourceType::PageHostedMedia(family) => write!(f, "page:{family}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceTypeParseError {
    #[error("unknown source type '{0}' (expected auto, swarm, direct or page:<family>)")]
    Unknown(String),

    #[error("unknown site family '{0}'")]
    UnknownFamily(String),
}

impl FromStr for SourceType {
    type Err = SourceTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();

        if let Some(family) = s.strip_prefix("page:") {
            return SiteFamily::ALL
                .iter()
                .find(|f| f.as_str() == family)
                .map(|f| SourceType::PageHostedMedia(*f))
                .ok_or_else(|| SourceTypeParseError::UnknownFamily(family.to_string()));
        }

        match s.as_str() {
            "auto" | "auto_detect" => Ok(SourceType::AutoDetect),
            "swarm" | "torrent" => Ok(SourceType::SwarmTransfer),
            "direct" | "direct_link" => Ok(SourceType::DirectFile),
            other => SiteFamily::ALL
                .iter()
                .find(|f| f.as_str() == other)
                .map(|f| SourceType::PageHostedMedia(*f))
                .ok_or_else(|| SourceTypeParseError::Unknown(other.to_string())),
        }
    }
}

/// Classify a URL. Total: unparseable input falls through to `DirectFile`.
///
/// Swarm checks run before host checks, so a `.torrent` hosted on a known
/// site is still a swarm transfer.
pub fn classify(url: &str) -> SourceType {
    let trimmed = url.trim();

    if is_swarm_address(trimmed) {
        return SourceType::SwarmTransfer;
    }

    let Ok(parsed) = Url::parse(trimmed) else {
        return SourceType::DirectFile;
    };

    let Some(host) = parsed.host_str().map(|h| h.to_ascii_lowercase()) else {
        return SourceType::DirectFile;
    };

    SiteFamily::ALL
        .iter()
        .find(|family| family.matches_host(&host))
        .map(|family| SourceType::PageHostedMedia(*family))
        .unwrap_or(SourceType::DirectFile)
}

/// Magnet link or a URL whose path names a `.torrent` file
pub fn is_swarm_address(url: &str) -> bool {
    if url.get(..7).is_some_and(|scheme| scheme.eq_ignore_ascii_case("magnet:")) {
        return true;
    }
    is_torrent_file_url(url)
}

pub fn is_torrent_file_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_ascii_lowercase().ends_with(".torrent"),
        Err(_) => {
            let path = url.split(['?', '#']).next().unwrap_or(url);
            path.to_ascii_lowercase().ends_with(".torrent")
        }
    }
}

fn host_within(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
