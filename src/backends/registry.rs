use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::direct::DirectFetch;
use super::extractor::ExtractorDelegate;
use super::swarm::SwarmTransfer;
use super::traits::Backend;
use crate::config::Config;
use crate::source::SourceType;
use crate::worker::http::HttpClient;

/// Acquisition strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    DirectFetch,
    ExtractorDelegate,
    SwarmTransfer,
}

impl BackendKind {
    /// Strategy for a resolved source type; `AutoDetect` has none
    pub fn for_source(source: SourceType) -> Option<Self> {
        match source {
            SourceType::SwarmTransfer => Some(Self::SwarmTransfer),
            SourceType::PageHostedMedia(_) => Some(Self::ExtractorDelegate),
            SourceType::DirectFile => Some(Self::DirectFetch),
            SourceType::AutoDetect => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectFetch => "direct-fetch",
            Self::ExtractorDelegate => "extractor-delegate",
            Self::SwarmTransfer => "swarm-transfer",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no backend registered for {0}")]
    NotFound(BackendKind),
}

/// Backend instances by kind
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<BackendKind, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the backend's own kind, replacing any previous one
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.insert(backend.kind(), backend);
    }

    pub fn get(&self, kind: BackendKind) -> Result<Arc<dyn Backend>, RegistryError> {
        self.backends
            .get(&kind)
            .cloned()
            .ok_or(RegistryError::NotFound(kind))
    }

    pub fn has_backend(&self, kind: BackendKind) -> bool {
        self.backends.contains_key(&kind)
    }

    /// Registry with the three built-in strategies
    pub fn with_defaults(config: &Config, http: HttpClient) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DirectFetch::new(http.clone())));
        registry.register(Arc::new(ExtractorDelegate::new(&config.extractor)));
        registry.register(Arc::new(SwarmTransfer::new(&config.swarm, http)));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::source::SiteFamily;

    #[test]
    fn test_source_mapping() {
        assert_eq!(
            BackendKind::for_source(SourceType::SwarmTransfer),
            Some(BackendKind::SwarmTransfer)
        );
        for family in SiteFamily::ALL {
            assert_eq!(
                BackendKind::for_source(SourceType::PageHostedMedia(family)),
                Some(BackendKind::ExtractorDelegate)
            );
        }
        assert_eq!(
            BackendKind::for_source(SourceType::DirectFile),
            Some(BackendKind::DirectFetch)
        );
        assert_eq!(BackendKind::for_source(SourceType::AutoDetect), None);
    }

    #[test]
    fn test_defaults_cover_every_kind() {
        let http = HttpClient::new(&HttpConfig::default()).unwrap();
        let registry = BackendRegistry::with_defaults(&Config::default(), http);

        for kind in [
            BackendKind::DirectFetch,
            BackendKind::ExtractorDelegate,
            BackendKind::SwarmTransfer,
        ] {
            assert!(registry.has_backend(kind));
            assert_eq!(registry.get(kind).unwrap().kind(), kind);
        }
    }

    #[test]
    fn test_missing_backend() {
        let registry = BackendRegistry::new();
        assert!(matches!(
            registry.get(BackendKind::SwarmTransfer),
            Err(RegistryError::NotFound(BackendKind::SwarmTransfer))
        ));
    }
}
