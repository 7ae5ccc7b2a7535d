//! Page retrieval, optionally through a headless browser

use crate::config::DiscoveryConfig;
use crate::error::{AcquireError, Result};
use crate::worker::http::HttpClient;
use crate::worker::process;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

const BROWSER_CANDIDATES: [&str; 4] = [
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
];

/// Browser start-up allowance on top of the render budget
const RENDER_GRACE: Duration = Duration::from_secs(15);

/// Page-fetch boundary used by link discovery
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// HTML of `url`; `render` asks for the DOM after client-side scripts ran
    async fn fetch_html(&self, url: &Url, render: bool, cancel: &CancellationToken)
    -> Result<String>;
}

/// Plain HTTP fetch with a headless-browser path for rendered pages
pub struct HttpPageFetcher {
    http: HttpClient,
    renderer: Option<HeadlessRenderer>,
}

impl HttpPageFetcher {
    pub fn new(http: HttpClient, config: &DiscoveryConfig) -> Self {
        let renderer = HeadlessRenderer::locate(config);
        if renderer.is_none() {
            debug!("No headless browser found, rendered pages fall back to plain fetch");
        }
        Self { http, renderer }
    }

    pub fn without_renderer(http: HttpClient) -> Self {
        Self {
            http,
            renderer: None,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_html(
        &self,
        url: &Url,
        render: bool,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if render {
            if let Some(renderer) = &self.renderer {
                return renderer.render(url, cancel).await;
            }
            warn!(url = %url, "Rendering requested but no browser available, using plain fetch");
        }

        self.http
            .get_text(url.as_str(), &[], cancel)
            .await
            .map_err(AcquireError::from)
    }
}

/// Chromium-family browser run with `--dump-dom`
#[derive(Debug, Clone)]
pub struct HeadlessRenderer {
    program: PathBuf,
    budget: Duration,
    grace: Duration,
}

impl HeadlessRenderer {
    pub fn new(program: PathBuf, budget: Duration) -> Self {
        Self {
            program,
            budget,
            grace: RENDER_GRACE,
        }
    }

    #[cfg(test)]
    fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Configured browser, else the first Chromium variant on PATH
    pub fn locate(config: &DiscoveryConfig) -> Option<Self> {
        let budget = config.render_timeout.as_duration();

        if let Some(browser) = &config.browser {
            return match which::which(browser) {
                Ok(path) => Some(Self::new(path, budget)),
                Err(e) => {
                    warn!(browser = %browser, error = %e, "Configured browser not found");
                    None
                }
            };
        }

        BROWSER_CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(|path| Self::new(path, budget))
    }

    pub fn args(&self, url: &Url) -> Vec<String> {
        vec![
            "--headless=new".to_string(),
            "--disable-gpu".to_string(),
            "--no-first-run".to_string(),
            "--mute-audio".to_string(),
            format!("--virtual-time-budget={}", self.budget.as_millis()),
            "--dump-dom".to_string(),
            url.to_string(),
        ]
    }

    pub async fn render(&self, url: &Url, cancel: &CancellationToken) -> Result<String> {
        let program = self.program.to_string_lossy();
        debug!(url = %url, browser = %program, "Rendering page");

        let output = process::run(
            &program,
            self.args(url),
            None,
            self.budget + self.grace,
            cancel,
        )
        .await?;

        if !output.success() {
            return Err(AcquireError::BackendExecution {
                program: program.into_owned(),
                code: output.code(),
                stderr: output.stderr_tail(5),
            });
        }

        Ok(output.stdout)
    }
}
