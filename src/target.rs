use bon::Builder;
use serde::Serialize;

use crate::source::SourceType;

/// One URL plus its acquisition intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Builder)]
pub struct AcquisitionTarget {
    #[builder(into)]
    pub url: String,
    #[builder(default)]
    pub source_type: SourceType,
    #[builder(default)]
    pub scrape_links: bool,
}

impl AcquisitionTarget {
    /// Copy of this target with `AutoDetect` replaced by the classified type
    pub fn resolved(&self) -> AcquisitionTarget {
        AcquisitionTarget {
            url: self.url.clone(),
            source_type: self.source_type.resolve(&self.url),
            scrape_links: self.scrape_links,
        }
    }

    /// Whether link discovery runs before this target is dispatched
    pub fn wants_discovery(&self) -> bool {
        self.scrape_links || self.source_type.resolve(&self.url).requires_crawl()
    }
}

/// Same-origin URL found on an origin target's page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredLink {
    pub url: String,
    pub origin: AcquisitionTarget,
}

impl DiscoveredLink {
    /// Subordinate target: inherits the origin's resolved source type and
    /// never crawls further
    pub fn into_target(self) -> AcquisitionTarget {
        let source_type = self.origin.source_type.resolve(&self.origin.url);
        AcquisitionTarget {
            url: self.url,
            source_type,
            scrape_links: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SiteFamily;

    #[test]
    fn test_builder_defaults() {
        let target = AcquisitionTarget::builder()
            .url("https://example.com/a.mp3")
            .build();
        assert_eq!(target.source_type, SourceType::AutoDetect);
        assert!(!target.scrape_links);
        assert_eq!(target.resolved().source_type, SourceType::DirectFile);
    }

    #[test]
    fn test_archive_targets_always_crawl() {
        let target = AcquisitionTarget::builder()
            .url("https://archive.org/details/some-item")
            .build();
        assert!(target.wants_discovery());

        let direct = AcquisitionTarget::builder()
            .url("https://example.com/page")
            .build();
        assert!(!direct.wants_discovery());
    }

    #[test]
    fn test_subordinate_inherits_resolved_type() {
        let origin = AcquisitionTarget::builder()
            .url("https://artist.bandcamp.com/album/x")
            .scrape_links(true)
            .build();
        let link = DiscoveredLink {
            url: "https://artist.bandcamp.com/track/y".into(),
            origin,
        };
        let target = link.into_target();
        assert_eq!(
            target.source_type,
            SourceType::PageHostedMedia(SiteFamily::Bandcamp)
        );
        assert!(!target.scrape_links);
    }
}
