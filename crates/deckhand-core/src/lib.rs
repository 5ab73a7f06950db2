//! Deckhand Core Library
//!
//! Build orchestration and chat command dispatch on top of
//! `deckhand-jenkins`:
//! - [`Orchestrator`]: trigger a job, wait for its build, report the result
//! - [`Dispatcher`]: map chat messages to orchestrator calls and replies
//! - [`PollPolicy`] / [`Backoff`]: retry timing of the polling loops
//! - [`CancelHandle`] / [`CancelSignal`]: abort running deploys

pub mod cancel;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod telemetry;
pub mod wait;

pub use cancel::{cancellation, CancelHandle, CancelSignal};
pub use dispatch::{Command, Dispatcher, ReplySink};
pub use error::{DeployError, Stage};
pub use metrics::METRICS;
pub use orchestrator::{DeployResult, DeploySummary, Orchestrator, OrchestratorConfig};
pub use telemetry::init_tracing;
pub use wait::{Backoff, FixedInterval, PollPolicy, DEFAULT_POLL_INTERVAL};

pub use deckhand_jenkins::{BuildNumber, CiClient, JobRef, LogTail};

/// Deckhand version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
