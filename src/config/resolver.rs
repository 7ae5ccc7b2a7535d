use super::models::{BackendConfig, BackendOverrides, Config};
use crate::source::{SiteFamily, SourceType};
use std::collections::BTreeMap;

/// Layers settings for one source type:
/// extractor defaults, then built-in family defaults, then `[backends.<key>]`
pub struct BackendResolver<'a> {
    config: &'a Config,
}

impl<'a> BackendResolver<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn resolve(&self, source: SourceType) -> BackendConfig {
        let mut resolved = self.base();

        if let Some(family) = source.family() {
            apply(&mut resolved, &family_defaults(family));
        }

        if let Some(overrides) = self.config.backends.get(source.config_key()) {
            apply(&mut resolved, overrides);
        }

        resolved
    }

    /// Effective settings for every configurable source
    pub fn resolve_all(&self) -> BTreeMap<&'static str, BackendConfig> {
        let sources = [SourceType::SwarmTransfer, SourceType::DirectFile]
            .into_iter()
            .chain(SiteFamily::ALL.into_iter().map(SourceType::PageHostedMedia));

        sources
            .map(|source| (source.config_key(), self.resolve(source)))
            .collect()
    }

    fn base(&self) -> BackendConfig {
        let extractor = &self.config.extractor;
        BackendConfig {
            format: extractor.format.clone(),
            audio_format: extractor.audio_format.clone(),
            audio_quality: extractor.audio_quality,
            headers: BTreeMap::new(),
            referer: None,
            max_retries: self.config.http.max_retries,
            ignore_errors: false,
            write_thumbnail: false,
            flat_playlist: false,
        }
    }
}

fn family_defaults(family: SiteFamily) -> BackendOverrides {
    match family {
        SiteFamily::SoundCloud => BackendOverrides {
            referer: Some("https://soundcloud.com/".to_string()),
            ..Default::default()
        },
        SiteFamily::Bandcamp => BackendOverrides {
            referer: Some("https://bandcamp.com/".to_string()),
            write_thumbnail: Some(false),
            ..Default::default()
        },
        // Item pages mix media with metadata files the extractor rejects
        SiteFamily::InternetArchive => BackendOverrides {
            ignore_errors: Some(true),
            ..Default::default()
        },
        SiteFamily::Mixcloud => BackendOverrides {
            referer: Some("https://www.mixcloud.com/".to_string()),
            ..Default::default()
        },
        SiteFamily::YouTube => BackendOverrides::default(),
    }
}

fn apply(target: &mut BackendConfig, overrides: &BackendOverrides) {
    if let Some(format) = &overrides.format {
        target.format = format.clone();
    }
    if let Some(audio_format) = &overrides.audio_format {
        target.audio_format = audio_format.clone();
    }
    if let Some(quality) = overrides.audio_quality {
        target.audio_quality = quality;
    }
    if let Some(referer) = &overrides.referer {
        target.referer = Some(referer.clone());
    }
    if let Some(retries) = overrides.max_retries {
        target.max_retries = retries;
    }
    if let Some(ignore) = overrides.ignore_errors {
        target.ignore_errors = ignore;
    }
    if let Some(thumbnail) = overrides.write_thumbnail {
        target.write_thumbnail = thumbnail;
    }
    if let Some(flat) = overrides.flat_playlist {
        target.flat_playlist = flat;
    }
    target
        .headers
        .extend(overrides.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_settings() {
        let config = Config::default();
        let resolver = BackendResolver::new(&config);

        let direct = resolver.resolve(SourceType::DirectFile);
        assert_eq!(direct.format, "bestaudio/best");
        assert_eq!(direct.audio_format, "mp3");
        assert_eq!(direct.audio_quality, 192);
        assert_eq!(direct.max_retries, 3);
        assert!(direct.referer.is_none());
        assert!(!direct.ignore_errors);
    }

    #[test]
    fn test_family_defaults() {
        let config = Config::default();
        let resolver = BackendResolver::new(&config);

        let archive = resolver.resolve(SourceType::PageHostedMedia(SiteFamily::InternetArchive));
        assert!(archive.ignore_errors);

        let soundcloud = resolver.resolve(SourceType::PageHostedMedia(SiteFamily::SoundCloud));
        assert_eq!(soundcloud.referer.as_deref(), Some("https://soundcloud.com/"));
    }

    #[test]
    fn test_overrides_win() {
        let mut config = Config::default();
        config.extractor.audio_quality = 128;
        let mut headers = BTreeMap::new();
        headers.insert("Cookie".to_string(), "session=1".to_string());
        config.backends.insert(
            "soundcloud".into(),
            BackendOverrides {
                audio_quality: Some(320),
                referer: Some("https://soundcloud.com/discover".into()),
                headers,
                ..Default::default()
            },
        );

        let resolver = BackendResolver::new(&config);
        let soundcloud = resolver.resolve(SourceType::PageHostedMedia(SiteFamily::SoundCloud));
        assert_eq!(soundcloud.audio_quality, 320);
        assert_eq!(
            soundcloud.referer.as_deref(),
            Some("https://soundcloud.com/discover")
        );
        assert_eq!(soundcloud.headers.len(), 1);

        let youtube = resolver.resolve(SourceType::PageHostedMedia(SiteFamily::YouTube));
        assert_eq!(youtube.audio_quality, 128);
        assert!(youtube.headers.is_empty());
    }

    #[test]
    fn test_resolve_all_covers_every_key() {
        let config = Config::default();
        let all = BackendResolver::new(&config).resolve_all();
        assert_eq!(all.len(), SourceType::config_keys().count());
        assert!(all.contains_key("archive"));
        assert!(all.contains_key("swarm"));
    }
}
