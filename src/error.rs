//! Error taxonomy shared by every acquisition stage

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Coarse failure category recorded in a batch report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedSource,
    Network,
    Parse,
    Extraction,
    BackendExecution,
    NoMediaFound,
    Packaging,
    Timeout,
    Cancelled,
    Filesystem,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedSource => "unsupported_source",
            Self::Network => "network",
            Self::Parse => "parse",
            Self::Extraction => "extraction",
            Self::BackendExecution => "backend_execution",
            Self::NoMediaFound => "no_media_found",
            Self::Packaging => "packaging",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Filesystem => "filesystem",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single acquisition step
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("{program} exited with {}: {stderr}", exit_label(.code))]
    BackendExecution {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("backend panicked: {0}")]
    Panicked(String),

    #[error("{0} not found; install it or set its path in the configuration")]
    ProgramNotFound(String),

    #[error("no media files found in {}", .0.display())]
    NoMediaFound(PathBuf),

    #[error("packaging failed: {0}")]
    Packaging(String),

    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout { operation: String, after: Duration },

    #[error("cancelled")]
    Cancelled,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl AcquireError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedSource(_) => ErrorKind::UnsupportedSource,
            Self::Network(_) => ErrorKind::Network,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Extraction(_) => ErrorKind::Extraction,
            Self::BackendExecution { .. } | Self::ProgramNotFound(_) | Self::Panicked(_) => {
                ErrorKind::BackendExecution
            }
            Self::NoMediaFound(_) => ErrorKind::NoMediaFound,
            Self::Packaging(_) => ErrorKind::Packaging,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io { .. } => ErrorKind::Filesystem,
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }
}

pub type Result<T> = std::result::Result<T, AcquireError>;

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "signal".to_string(),
    }
}

/// Errors that stop a run before any target is attempted
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("output root {} is not writable: {source}", .path.display())]
    OutputRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("no targets given")]
    NoTargets,

    #[error("failed to read target list {}: {source}", .path.display())]
    TargetList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Text carried by a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
