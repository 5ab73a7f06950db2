//! Deckhand Jenkins: the CI server side of a deploy
//!
//! This crate speaks the small part of the Jenkins remote API that a
//! chat-triggered deploy needs: triggering a job, following its queue item
//! to a build number, polling the build and reading the end of its console
//! log. Everything sits behind the [`CiClient`] trait so orchestration can
//! run against [`fakes::ScriptedCiClient`] in tests.

pub mod client;
pub mod config;
pub mod error;
pub mod fakes;
pub mod model;

pub use client::{CiClient, Endpoints, JenkinsClient};
pub use config::JenkinsConfig;
pub use error::{CiError, CiResult};
pub use model::{
    BuildDetail, BuildNumber, BuildOutcome, JobRef, LogTail, QueueItem, QueueTicket, RootListing,
    DEFAULT_LOG_TAIL_LINES, SUCCESS_RESULT,
};
