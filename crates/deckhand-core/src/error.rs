//! Failure taxonomy for a deploy run.

use deckhand_jenkins::{CiError, LogTail};
use serde::{Deserialize, Serialize};

/// Where in the deploy workflow a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Triggering the job
    Submitting,
    /// Waiting for the queue item to get a build number
    ResolvingQueue,
    /// Waiting for the build to finish
    Polling,
    /// The build itself ran and did not succeed
    Build,
    /// Reading the console log of a failed build
    FetchingLog,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Submitting => "submitting",
            Stage::ResolvingQueue => "resolving queue item",
            Stage::Polling => "polling build status",
            Stage::Build => "build",
            Stage::FetchingLog => "fetching console log",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a deploy ended in failure.
///
/// Transient conditions (queue item without executor, build still running)
/// never surface here; the orchestrator retries them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeployError {
    #[error("could not trigger job: {0}")]
    Submission(#[source] CiError),

    #[error("could not resolve build number: {0}")]
    Resolution(#[source] CiError),

    #[error("could not check build status: {0}")]
    Status(#[source] CiError),

    #[error("build finished with result {}", .result.as_deref().unwrap_or("UNKNOWN"))]
    BuildFailed {
        result: Option<String>,
        log_tail: LogTail,
    },

    #[error(
        "build finished with result {} and its console log is unavailable: {}",
        .result.as_deref().unwrap_or("UNKNOWN"),
        .source
    )]
    LogUnavailable {
        result: Option<String>,
        source: CiError,
    },

    #[error("gave up {stage} after {attempts} attempts")]
    TimedOut { stage: Stage, attempts: u32 },

    #[error("cancelled while {stage}")]
    Cancelled { stage: Stage },
}

impl DeployError {
    /// Stage the failure belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            DeployError::Submission(_) => Stage::Submitting,
            DeployError::Resolution(_) => Stage::ResolvingQueue,
            DeployError::Status(_) => Stage::Polling,
            DeployError::BuildFailed { .. } => Stage::Build,
            DeployError::LogUnavailable { .. } => Stage::FetchingLog,
            DeployError::TimedOut { stage, .. } | DeployError::Cancelled { stage } => *stage,
        }
    }

    /// Console tail of a failed build, when one was retrieved.
    pub fn log_tail(&self) -> Option<&LogTail> {
        match self {
            DeployError::BuildFailed { log_tail, .. } => Some(log_tail),
            _ => None,
        }
    }

    /// True when the build ran to completion and failed, as opposed to the
    /// workflow breaking down around it.
    pub fn is_build_failure(&self) -> bool {
        matches!(
            self,
            DeployError::BuildFailed { .. } | DeployError::LogUnavailable { .. }
        )
    }
}
