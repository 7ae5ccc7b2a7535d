use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::registry::BackendKind;
use crate::config::BackendConfig;
use crate::error::Result;
use crate::output::OutputDir;
use crate::target::AcquisitionTarget;

/// Shared state every acquisition runs against
#[derive(Clone)]
pub struct AcquireContext {
    pub output: Arc<OutputDir>,
    pub cancel: CancellationToken,
}

/// Files a backend placed in the output root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquired {
    pub path: PathBuf,
    pub additional: Vec<PathBuf>,
}

impl Acquired {
    pub fn single(path: PathBuf) -> Self {
        Self {
            path,
            additional: Vec::new(),
        }
    }

    /// First path is primary; `None` when nothing was produced
    pub fn from_paths(paths: Vec<PathBuf>) -> Option<Self> {
        let mut paths = paths.into_iter();
        let path = paths.next()?;
        Some(Self {
            path,
            additional: paths.collect(),
        })
    }
}

/// Acquisition strategy
///
/// Backends receive a target whose source type is already resolved and the
/// settings merged for that source. Every file they produce must reach the
/// output root through `OutputDir::place` or `OutputDir::relocate`.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn acquire(
        &self,
        target: &AcquisitionTarget,
        config: &BackendConfig,
        ctx: &AcquireContext,
    ) -> Result<Acquired>;
}
