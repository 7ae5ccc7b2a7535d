//! Link discovery: find same-origin media links on a target's page

pub mod fetch;
pub mod links;

pub use fetch::{HeadlessRenderer, HttpPageFetcher, PageFetcher};
pub use links::{LinkRules, extract_links};

use crate::config::DiscoveryConfig;
use crate::target::{AcquisitionTarget, DiscoveredLink};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Single-hop crawler. Faults never escape: they are logged and yield no
/// links.
pub struct LinkDiscovery {
    fetcher: Arc<dyn PageFetcher>,
    rules: LinkRules,
    render_hosts: Vec<String>,
}

impl LinkDiscovery {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &DiscoveryConfig) -> Self {
        Self {
            fetcher,
            rules: LinkRules::from_config(config),
            render_hosts: config
                .render_hosts
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
        }
    }

    pub async fn discover(
        &self,
        target: &AcquisitionTarget,
        cancel: &CancellationToken,
    ) -> Vec<DiscoveredLink> {
        let page = match Url::parse(target.url.trim()) {
            Ok(page) if matches!(page.scheme(), "http" | "https") => page,
            Ok(page) => {
                warn!(url = %target.url, scheme = page.scheme(), "Discovery skipped: not a web page");
                return Vec::new();
            }
            Err(e) => {
                warn!(url = %target.url, error = %e, "Discovery skipped: invalid URL");
                return Vec::new();
            }
        };

        let render = self.needs_render(target, &page);
        debug!(url = %page, render, "Fetching page for link discovery");

        let html = match self.fetcher.fetch_html(&page, render, cancel).await {
            Ok(html) => html,
            Err(e) => {
                warn!(url = %page, error = %e, "Discovery fetch failed");
                return Vec::new();
            }
        };

        let links: Vec<DiscoveredLink> = extract_links(&html, &page, &self.rules)
            .into_iter()
            .map(|url| DiscoveredLink {
                url: url.into(),
                origin: target.clone(),
            })
            .collect();

        info!(url = %page, count = links.len(), "Links discovered");
        links
    }

    fn needs_render(&self, target: &AcquisitionTarget, page: &Url) -> bool {
        if target.source_type.resolve(&target.url).requires_render() {
            return true;
        }
        page.host_str().is_some_and(|host| {
            let host = host.to_ascii_lowercase();
            self.render_hosts
                .iter()
                .any(|listed| host == *listed || host.ends_with(&format!(".{listed}")))
        })
    }
}
