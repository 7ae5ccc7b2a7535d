//! Per-target results and the batch summary

use crate::error::{AcquireError, ErrorKind};
use crate::target::AcquisitionTarget;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Terminal state of one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        path: PathBuf,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        additional: Vec<PathBuf>,
    },
    Failure {
        kind: ErrorKind,
        message: String,
    },
}

impl Outcome {
    pub fn failure(err: &AcquireError) -> Self {
        Outcome::Failure {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Failure { kind, .. } => Some(*kind),
            Outcome::Success { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionResult {
    pub target: AcquisitionTarget,
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl AcquisitionResult {
    /// Result for a target that never started
    pub fn cancelled(target: AcquisitionTarget) -> Self {
        Self {
            target,
            outcome: Outcome::failure(&AcquireError::Cancelled),
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

impl fmt::Display for AcquisitionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Success { path, additional } if additional.is_empty() => {
                write!(f, "ok    {} -> {}", self.target.url, path.display())
            }
            Outcome::Success { path, additional } => write!(
                f,
                "ok    {} -> {} (+{} more)",
                self.target.url,
                path.display(),
                additional.len()
            ),
            Outcome::Failure { kind, message } => {
                write!(f, "FAIL  {} [{kind}] {message}", self.target.url)
            }
        }
    }
}

/// Ordered results of one batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    #[serde(serialize_with = "serialize_timestamp")]
    pub started_at: OffsetDateTime,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub total: usize,
    pub succeeded: usize,
    pub results: Vec<AcquisitionResult>,
}

impl BatchReport {
    pub fn new(started_at: OffsetDateTime, elapsed: Duration, results: Vec<AcquisitionResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            started_at,
            elapsed,
            total: results.len(),
            succeeded,
            results,
        }
    }

    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }

    pub fn any_succeeded(&self) -> bool {
        self.succeeded > 0
    }

    pub fn summary_line(&self) -> String {
        format!("{} of {} succeeded", self.succeeded, self.total)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn serialize_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64((value.as_secs_f64() * 1000.0).round() / 1000.0)
}

fn serialize_timestamp<S: Serializer>(
    value: &OffsetDateTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let formatted = value.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&formatted)
}
