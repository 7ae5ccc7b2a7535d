use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;

use super::registry::{BackendKind, BackendRegistry};
use super::traits::{AcquireContext, Acquired};
use crate::config::Config;
use crate::error::{AcquireError, Result, panic_message};
use crate::output::OutputDir;
use crate::report::{AcquisitionResult, Outcome};
use crate::target::AcquisitionTarget;

/// Routes one target to its backend and turns the outcome into a result
pub struct Dispatcher {
    registry: BackendRegistry,
    config: Arc<Config>,
    output: Arc<OutputDir>,
}

impl Dispatcher {
    pub fn new(registry: BackendRegistry, config: Arc<Config>, output: Arc<OutputDir>) -> Self {
        Self {
            registry,
            config,
            output,
        }
    }

    pub fn output(&self) -> &Arc<OutputDir> {
        &self.output
    }

    /// Never fails: every error, panics included, ends up in the result
    pub async fn dispatch(
        &self,
        target: &AcquisitionTarget,
        cancel: &CancellationToken,
    ) -> AcquisitionResult {
        let started = Instant::now();

        if cancel.is_cancelled() {
            return AcquisitionResult::cancelled(target.clone());
        }

        if let Err(e) = validate_url(&target.url) {
            warn!(url = %target.url, "Rejected target");
            return AcquisitionResult {
                target: target.clone(),
                outcome: Outcome::failure(&e),
                elapsed: started.elapsed(),
            };
        }

        let resolved = target.resolved();
        let outcome = match self.acquire(&resolved, cancel).await {
            Ok(acquired) => Outcome::Success {
                path: acquired.path,
                additional: acquired.additional,
            },
            Err(e) => {
                warn!(url = %resolved.url, kind = %e.kind(), error = %e, "Acquisition failed");
                Outcome::failure(&e)
            }
        };

        AcquisitionResult {
            target: resolved,
            outcome,
            elapsed: started.elapsed(),
        }
    }

    async fn acquire(&self, target: &AcquisitionTarget, cancel: &CancellationToken) -> Result<Acquired> {
        let kind = BackendKind::for_source(target.source_type)
            .ok_or_else(|| AcquireError::UnsupportedSource(target.url.clone()))?;
        let backend = self
            .registry
            .get(kind)
            .map_err(|e| AcquireError::UnsupportedSource(format!("{}: {e}", target.url)))?;
        let config = self.config.backend_resolver().resolve(target.source_type);

        debug!(
            url = %target.url,
            source_type = %target.source_type,
            backend = %kind,
            "Dispatching target"
        );

        let ctx = AcquireContext {
            output: Arc::clone(&self.output),
            cancel: cancel.clone(),
        };

        match AssertUnwindSafe(backend.acquire(target, &config, &ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(url = %target.url, backend = %kind, panic = %message, "Backend panicked");
                Err(AcquireError::Panicked(message))
            }
        }
    }
}

/// `http`/`https` with a host, or a magnet link
pub fn validate_url(url: &str) -> Result<()> {
    if url
        .get(..7)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("magnet:"))
    {
        return Ok(());
    }

    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some() => Ok(()),
        _ => Err(AcquireError::UnsupportedSource(url.to_string())),
    }
}
