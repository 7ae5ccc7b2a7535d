//! Logging setup and batch counters

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over `verbosity`.
///
/// Logs go to stderr so stdout stays free for results.
pub fn init(verbosity: u8) {
    let default = match verbosity {
        0 => "mediafetch=info",
        1 => "mediafetch=debug",
        _ => "mediafetch=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Counters for one batch run
#[derive(Debug, Default)]
pub struct Metrics {
    targets_attempted: AtomicU64,
    targets_succeeded: AtomicU64,
    targets_failed: AtomicU64,
    links_discovered: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_finished(&self, success: bool) {
        self.targets_attempted.fetch_add(1, Ordering::Relaxed);
        if success {
            self.targets_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.targets_failed.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(success, "Metric incremented");
    }

    pub fn links_discovered(&self, count: usize) {
        self.links_discovered
            .fetch_add(count as u64, Ordering::Relaxed);
        tracing::trace!(counter = "links_discovered", count, "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            targets_attempted: self.targets_attempted.load(Ordering::Relaxed),
            targets_succeeded: self.targets_succeeded.load(Ordering::Relaxed),
            targets_failed: self.targets_failed.load(Ordering::Relaxed),
            links_discovered: self.links_discovered.load(Ordering::Relaxed),
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        tracing::info!(
            attempted = s.targets_attempted,
            succeeded = s.targets_succeeded,
            failed = s.targets_failed,
            links_discovered = s.links_discovered,
            "Batch finished"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub targets_attempted: u64,
    pub targets_succeeded: u64,
    pub targets_failed: u64,
    pub links_discovered: u64,
}
