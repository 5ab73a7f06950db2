//! Structured observability hooks for the deploy lifecycle.
//!
//! This module provides:
//! - A deploy-scoped tracing span carrying a per-run `deploy_id`
//! - Emission functions for key lifecycle events: start, build resolved,
//!   poll retry, finish
//!
//! Events are emitted at `info!` level except retries (`debug!`) and
//! failures (`warn!`). For JSON output, start the binary with `--json`.

use std::time::Duration;

use deckhand_jenkins::{BuildNumber, JobRef};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Stage;
use crate::orchestrator::DeployResult;

/// Span that tags every event of one deploy run.
///
/// Attach it with `tracing::Instrument` rather than entering it, since the
/// run crosses await points.
pub fn deploy_span(deploy_id: &Uuid, job: &JobRef) -> tracing::Span {
    tracing::info_span!("deckhand.deploy", deploy_id = %deploy_id, job = %job)
}

/// Emit event: deploy requested.
pub fn emit_deploy_started(job: &JobRef) {
    info!(
        event = "deploy.started",
        job = %job.name(),
        revision = job.revision().unwrap_or("-"),
    );
}

/// Emit event: queue item turned into a build number.
pub fn emit_build_resolved(build: &BuildNumber, attempts: u32) {
    info!(
        event = "deploy.build_resolved",
        job = %build.job().name(),
        build = build.value(),
        attempts = attempts,
    );
}

/// Emit event: a polling loop is about to wait before its next attempt.
pub fn emit_poll_retry(stage: Stage, attempts: u32, delay: Duration) {
    debug!(
        event = "deploy.poll_retry",
        stage = %stage,
        attempts = attempts,
        delay_ms = delay.as_millis() as u64,
    );
}

/// Emit event: deploy reached a terminal result.
pub fn emit_deploy_finished(result: &DeployResult, duration_ms: u64) {
    let build = result.build().map(BuildNumber::value);
    match result {
        DeployResult::Success { job, .. } => info!(
            event = "deploy.finished",
            job = %job.name(),
            build = build,
            duration_ms = duration_ms,
            success = true,
        ),
        DeployResult::Failure { job, reason, .. } => warn!(
            event = "deploy.finished",
            job = %job.name(),
            build = build,
            duration_ms = duration_ms,
            success = false,
            stage = %reason.stage(),
            error = %reason,
        ),
    }
}
