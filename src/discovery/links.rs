//! Anchor extraction and same-origin media filtering

use crate::config::DiscoveryConfig;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// What makes a link worth following
#[derive(Debug, Clone)]
pub struct LinkRules {
    extensions: Vec<String>,
    keywords: Vec<String>,
}

impl LinkRules {
    pub fn new<E, K>(extensions: E, keywords: K) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        K: IntoIterator,
        K::Item: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().to_ascii_lowercase())
                .collect(),
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(&config.media_extensions, &config.page_keywords)
    }

    /// Media file extension or media page keyword in the path
    pub fn matches_path(&self, path: &str) -> bool {
        let path = path.to_ascii_lowercase();
        self.extensions.iter().any(|ext| path.ends_with(ext.as_str()))
            || self.keywords.iter().any(|kw| path.contains(kw.as_str()))
    }
}

impl Default for LinkRules {
    fn default() -> Self {
        Self::from_config(&DiscoveryConfig::default())
    }
}

/// Same-origin media links in document order, deduplicated, without the
/// page itself
pub fn extract_links(html: &str, page: &Url, rules: &LinkRules) -> Vec<Url> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut page = page.clone();
    page.set_fragment(None);

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&selector) {
        let href = element.value().attr("href").unwrap_or("").trim();
        if href.is_empty() || href.starts_with('#') {
            continue;
        }

        let Ok(mut resolved) = page.join(href) else {
            continue;
        };
        resolved.set_fragment(None);

        if resolved == page || !same_origin(&page, &resolved) {
            continue;
        }
        if !rules.matches_path(resolved.path()) {
            continue;
        }
        if seen.insert(resolved.as_str().to_string()) {
            links.push(resolved);
        }
    }

    links
}

/// Same host and explicit port. The scheme may differ, so an http page
/// keeps its https links; default ports are already normalized away.
fn same_origin(a: &Url, b: &Url) -> bool {
    a.host_str().map(str::to_ascii_lowercase) == b.host_str().map(str::to_ascii_lowercase)
        && a.port() == b.port()
}
