//! Batch orchestration
//!
//! Runs a bounded number of target pipelines at once. Each pipeline
//! discovers subordinate links when asked to, dispatches its target and
//! then its subordinates in discovery order. Results come back grouped per
//! original target, in submission order.

pub mod http;
pub mod process;

use futures::{FutureExt, StreamExt, stream};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::backends::{BackendRegistry, Dispatcher};
use crate::config::Config;
use crate::discovery::{HttpPageFetcher, LinkDiscovery};
use crate::error::{SetupError, panic_message};
use crate::observability::Metrics;
use crate::output::OutputDir;
use crate::report::{AcquisitionResult, BatchReport};
use crate::target::{AcquisitionTarget, DiscoveredLink};
use self::http::HttpClient;

pub struct BatchOrchestrator {
    dispatcher: Dispatcher,
    discovery: LinkDiscovery,
    concurrency: usize,
    metrics: Metrics,
}

impl BatchOrchestrator {
    pub fn new(dispatcher: Dispatcher, discovery: LinkDiscovery, concurrency: usize) -> Self {
        Self {
            dispatcher,
            discovery,
            concurrency: concurrency.max(1),
            metrics: Metrics::new(),
        }
    }

    /// Wire the built-in backends and an HTTP page fetcher
    pub fn from_config(config: Arc<Config>, output: Arc<OutputDir>) -> Result<Self, SetupError> {
        let http = HttpClient::new(&config.http).map_err(|e| SetupError::HttpClient(e.to_string()))?;

        let fetcher = Arc::new(HttpPageFetcher::new(http.clone(), &config.discovery));
        let discovery = LinkDiscovery::new(fetcher, &config.discovery);
        let registry = BackendRegistry::with_defaults(&config, http);
        let concurrency = config.worker.concurrency;

        Ok(Self::new(
            Dispatcher::new(registry, config, output),
            discovery,
            concurrency,
        ))
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub async fn run(&self, targets: Vec<AcquisitionTarget>, cancel: &CancellationToken) -> BatchReport {
        let started_at = OffsetDateTime::now_utc();
        let started = Instant::now();

        info!(
            targets = targets.len(),
            concurrency = self.concurrency,
            output = %self.dispatcher.output().root().display(),
            "Starting batch"
        );

        let grouped: Vec<Vec<AcquisitionResult>> = stream::iter(targets)
            .map(|target| self.run_target(target, cancel))
            .buffered(self.concurrency)
            .collect()
            .await;

        self.metrics.log_summary();
        BatchReport::new(started_at, started.elapsed(), grouped.into_iter().flatten().collect())
    }

    /// One pipeline: discovery, the target itself, then its subordinates
    async fn run_target(&self, target: AcquisitionTarget, cancel: &CancellationToken) -> Vec<AcquisitionResult> {
        if cancel.is_cancelled() {
            return vec![self.record(AcquisitionResult::cancelled(target))];
        }

        let links = if target.wants_discovery() {
            self.discover(&target, cancel).await
        } else {
            Vec::new()
        };
        self.metrics.links_discovered(links.len());

        let mut results = Vec::with_capacity(links.len() + 1);
        results.push(self.record(self.dispatcher.dispatch(&target, cancel).await));

        for link in links {
            let subordinate = link.into_target();
            debug!(url = %subordinate.url, origin = %target.url, "Dispatching discovered link");
            results.push(self.record(self.dispatcher.dispatch(&subordinate, cancel).await));
        }

        results
    }

    /// A panicking fetcher or parser counts as a page with no links
    async fn discover(&self, target: &AcquisitionTarget, cancel: &CancellationToken) -> Vec<DiscoveredLink> {
        match AssertUnwindSafe(self.discovery.discover(target, cancel))
            .catch_unwind()
            .await
        {
            Ok(links) => links,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(url = %target.url, panic = %message, "Link discovery panicked");
                Vec::new()
            }
        }
    }

    fn record(&self, result: AcquisitionResult) -> AcquisitionResult {
        self.metrics.target_finished(result.is_success());
        info!("{result}");
        result
    }
}
