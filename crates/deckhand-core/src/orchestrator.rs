//! Deploy orchestration: trigger a job and follow it to a terminal result.
//!
//! A run walks a fixed sequence of states:
//!
//! ```text
//! Submitting -> ResolvingQueue -> Polling -> (FetchingLog) -> result
//! ```
//!
//! - `Submitting` triggers the job exactly once. Triggering is not
//!   idempotent, so a failed submission is never retried.
//! - `ResolvingQueue` asks for the queue item's build number until Jenkins
//!   assigns an executor, waiting between attempts.
//! - `Polling` checks the build until it stops running. A failing status
//!   check ends the run.
//! - `FetchingLog` runs only for builds that finished without `SUCCESS`.
//!
//! Retry timing and limits come from [`PollPolicy`]; a [`CancelSignal`]
//! aborts waits and in-flight lookups.

use std::future::Future;
use std::sync::Arc;

use deckhand_jenkins::{
    BuildNumber, CiClient, CiResult, JobRef, QueueTicket, DEFAULT_LOG_TAIL_LINES,
};
use serde::Serialize;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::cancel::CancelSignal;
use crate::error::{DeployError, Stage};
use crate::metrics::METRICS;
use crate::obs;
use crate::wait::PollPolicy;

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Retry policy while waiting for a build number.
    pub queue_poll: PollPolicy,
    /// Retry policy while waiting for the build to finish.
    pub status_poll: PollPolicy,
    /// Console lines attached to a failed build.
    pub log_tail_lines: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            queue_poll: PollPolicy::default(),
            status_poll: PollPolicy::default(),
            log_tail_lines: DEFAULT_LOG_TAIL_LINES,
        }
    }
}

impl OrchestratorConfig {
    /// Use `policy` for both polling loops.
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.queue_poll = policy.clone();
        self.status_poll = policy;
        self
    }
}

/// Terminal result of one deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployResult {
    Success {
        job: JobRef,
        build: BuildNumber,
    },
    Failure {
        job: JobRef,
        /// Set when the failure happened after the build number was known.
        build: Option<BuildNumber>,
        reason: DeployError,
    },
}

impl DeployResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DeployResult::Success { .. })
    }

    pub fn job(&self) -> &JobRef {
        match self {
            DeployResult::Success { job, .. } | DeployResult::Failure { job, .. } => job,
        }
    }

    pub fn build(&self) -> Option<&BuildNumber> {
        match self {
            DeployResult::Success { build, .. } => Some(build),
            DeployResult::Failure { build, .. } => build.as_ref(),
        }
    }

    pub fn reason(&self) -> Option<&DeployError> {
        match self {
            DeployResult::Success { .. } => None,
            DeployResult::Failure { reason, .. } => Some(reason),
        }
    }

    /// Flat, serializable view for machine-readable output.
    pub fn summary(&self) -> DeploySummary {
        let reason = self.reason();
        DeploySummary {
            job: self.job().name().to_string(),
            revision: self.job().revision().map(str::to_string),
            build: self.build().map(BuildNumber::value),
            success: self.is_success(),
            stage: reason.map(DeployError::stage),
            error: reason.map(ToString::to_string),
            log_tail: reason
                .and_then(DeployError::log_tail)
                .map(|t| t.lines().to_vec())
                .unwrap_or_default(),
        }
    }
}

/// Serializable summary of a [`DeployResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploySummary {
    pub job: String,
    pub revision: Option<String>,
    pub build: Option<u64>,
    pub success: bool,
    pub stage: Option<Stage>,
    pub error: Option<String>,
    pub log_tail: Vec<String>,
}

/// Where a run currently is. Each state owns exactly what the next step
/// needs, so a ticket is gone once its build number is known.
#[derive(Debug)]
enum State {
    Submitting,
    ResolvingQueue {
        ticket: QueueTicket,
        attempts: u32,
        started: Instant,
    },
    Polling {
        build: BuildNumber,
        attempts: u32,
        started: Instant,
    },
    FetchingLog {
        build: BuildNumber,
        result: Option<String>,
    },
}

enum Transition {
    Next(State),
    Succeeded(BuildNumber),
}

/// A run that ended in failure, with whatever build context was known.
struct Failed {
    build: Option<BuildNumber>,
    reason: DeployError,
}

impl Failed {
    fn new(build: Option<&BuildNumber>, reason: DeployError) -> Self {
        Self {
            build: build.cloned(),
            reason,
        }
    }
}

/// Drives deploys through a [`CiClient`].
///
/// Holds no per-run state: one orchestrator can serve any number of
/// concurrent deploys.
#[derive(Clone)]
pub struct Orchestrator {
    client: Arc<dyn CiClient>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn CiClient>) -> Self {
        Self::with_config(client, OrchestratorConfig::default())
    }

    pub fn with_config(client: Arc<dyn CiClient>, config: OrchestratorConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Trigger `job`, wait for it and report how it ended.
    pub async fn run_deploy(&self, job: JobRef) -> DeployResult {
        self.run_deploy_until(job, &CancelSignal::never()).await
    }

    /// Like [`run_deploy`](Self::run_deploy), but gives up with
    /// `DeployError::Cancelled` once `cancel` fires.
    pub async fn run_deploy_until(&self, job: JobRef, cancel: &CancelSignal) -> DeployResult {
        let deploy_id = Uuid::new_v4();
        let span = obs::deploy_span(&deploy_id, &job);
        let started = Instant::now();

        async {
            METRICS.inc_deploys_started();
            obs::emit_deploy_started(&job);

            let result = self.drive(job, cancel).await;

            METRICS.record_outcome(result.is_success());
            obs::emit_deploy_finished(&result, started.elapsed().as_millis() as u64);
            result
        }
        .instrument(span)
        .await
    }

    /// Names of the jobs on the server. Not part of the deploy workflow.
    pub async fn list_jobs(&self) -> CiResult<Vec<String>> {
        self.client.list_jobs().await
    }

    async fn drive(&self, job: JobRef, cancel: &CancelSignal) -> DeployResult {
        let mut state = State::Submitting;
        loop {
            match self.step(&job, state, cancel).await {
                Ok(Transition::Next(next)) => state = next,
                Ok(Transition::Succeeded(build)) => return DeployResult::Success { job, build },
                Err(Failed { build, reason }) => {
                    return DeployResult::Failure { job, build, reason }
                }
            }
        }
    }

    async fn step(
        &self,
        job: &JobRef,
        state: State,
        cancel: &CancelSignal,
    ) -> Result<Transition, Failed> {
        match state {
            State::Submitting => {
                if cancel.is_cancelled() {
                    return Err(Failed::new(
                        None,
                        DeployError::Cancelled {
                            stage: Stage::Submitting,
                        },
                    ));
                }
                // Not raced against cancellation: once sent, the build may
                // already be queued and the caller must hear about it.
                match self.client.submit(job).await {
                    Ok(ticket) => Ok(Transition::Next(State::ResolvingQueue {
                        ticket,
                        attempts: 0,
                        started: Instant::now(),
                    })),
                    Err(e) => Err(Failed::new(None, DeployError::Submission(e))),
                }
            }

            State::ResolvingQueue {
                ticket,
                attempts,
                started,
            } => {
                let attempts = attempts + 1;
                METRICS.inc_queue_polls();
                let lookup = self.client.resolve_build_number(&ticket);
                match self
                    .guarded(Stage::ResolvingQueue, None, cancel, lookup)
                    .await?
                {
                    Ok(build) => {
                        obs::emit_build_resolved(&build, attempts);
                        Ok(Transition::Next(State::Polling {
                            build,
                            attempts: 0,
                            started: Instant::now(),
                        }))
                    }
                    Err(e) if e.is_transient() => {
                        let policy = &self.config.queue_poll;
                        self.pause(policy, Stage::ResolvingQueue, None, attempts, started, cancel)
                            .await?;
                        Ok(Transition::Next(State::ResolvingQueue {
                            ticket,
                            attempts,
                            started,
                        }))
                    }
                    Err(e) => Err(Failed::new(None, DeployError::Resolution(e))),
                }
            }

            State::Polling {
                build,
                attempts,
                started,
            } => {
                let attempts = attempts + 1;
                METRICS.inc_status_polls();
                let check = self.client.check_status(&build);
                let checked = self
                    .guarded(Stage::Polling, Some(&build), cancel, check)
                    .await?;
                let outcome = match checked {
                    Ok(outcome) => outcome,
                    Err(e) => return Err(Failed::new(Some(&build), DeployError::Status(e))),
                };

                if outcome.still_running {
                    let policy = &self.config.status_poll;
                    self.pause(policy, Stage::Polling, Some(&build), attempts, started, cancel)
                        .await?;
                    Ok(Transition::Next(State::Polling {
                        build,
                        attempts,
                        started,
                    }))
                } else if outcome.succeeded {
                    Ok(Transition::Succeeded(build))
                } else {
                    Ok(Transition::Next(State::FetchingLog {
                        build,
                        result: outcome.result,
                    }))
                }
            }

            State::FetchingLog { build, result } => {
                let reason = match self
                    .client
                    .fetch_log_tail(&build, self.config.log_tail_lines)
                    .await
                {
                    Ok(log_tail) => DeployError::BuildFailed { result, log_tail },
                    Err(source) => DeployError::LogUnavailable { result, source },
                };
                Err(Failed::new(Some(&build), reason))
            }
        }
    }

    /// Run `fut` unless cancellation fires first.
    async fn guarded<T>(
        &self,
        stage: Stage,
        build: Option<&BuildNumber>,
        cancel: &CancelSignal,
        fut: impl Future<Output = T>,
    ) -> Result<T, Failed> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Failed::new(build, DeployError::Cancelled { stage })),
            out = fut => Ok(out),
        }
    }

    /// Wait before the next attempt of a polling loop, or fail if the
    /// policy allows no further attempts.
    async fn pause(
        &self,
        policy: &PollPolicy,
        stage: Stage,
        build: Option<&BuildNumber>,
        attempts: u32,
        started: Instant,
        cancel: &CancelSignal,
    ) -> Result<(), Failed> {
        if policy.exhausted(attempts, started) {
            return Err(Failed::new(build, DeployError::TimedOut { stage, attempts }));
        }
        let delay = policy.backoff.delay(attempts);
        obs::emit_poll_retry(stage, attempts, delay);
        self.guarded(stage, build, cancel, tokio::time::sleep(delay))
            .await
    }
}
