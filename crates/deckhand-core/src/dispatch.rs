//! Chat command dispatch.
//!
//! Turns a chat message into a [`Command`], runs it against the
//! orchestrator and renders the outcome as chat replies. The messaging
//! transport stays outside: replies go to a [`ReplySink`].
//!
//! ## Commands
//!
//! - `/deploy {job} [sha1]`: trigger a job and report how it ended
//! - `/jobs`: list all jobs
//! - `/ping`: reply `pong`
//! - anything else: help text

use async_trait::async_trait;
use deckhand_jenkins::{CiError, JobRef};
use tracing::{debug, info};

use crate::cancel::CancelSignal;
use crate::error::DeployError;
use crate::orchestrator::{DeployResult, Orchestrator};

pub const HELP_TEXT: &str = "Available commands:\n\
/deploy {job} [sha1]  deploy a job\n\
/jobs  list all jobs\n\
/ping  reply pong to show I am alive";

pub const DEPLOY_USAGE: &str = "Usage: /deploy {job} [sha1]";

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Deploy(JobRef),
    /// `/deploy` without a job name
    DeployUsage,
    Jobs,
    Ping,
    Help,
}

impl Command {
    /// Parse a chat message. `/cmd@botname` addresses the same command as
    /// `/cmd`; words after the expected arguments are ignored.
    pub fn parse(text: &str) -> Self {
        let mut words = text.split_whitespace();
        let Some(head) = words.next().and_then(|w| w.strip_prefix('/')) else {
            return Command::Help;
        };
        let name = head.split('@').next().unwrap_or_default();

        match name.to_ascii_lowercase().as_str() {
            "deploy" => match words.next() {
                Some(job) => Command::Deploy(JobRef::new(job).with_revision(words.next())),
                None => Command::DeployUsage,
            },
            "jobs" => Command::Jobs,
            "ping" => Command::Ping,
            _ => Command::Help,
        }
    }
}

/// Where rendered replies go (a chat channel, stdout, a test buffer).
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, text: String);
}

/// Handles chat messages one at a time. Clone it into each task to serve
/// messages concurrently.
#[derive(Clone)]
pub struct Dispatcher {
    orchestrator: Orchestrator,
    cancel: CancelSignal,
}

impl Dispatcher {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            cancel: CancelSignal::never(),
        }
    }

    /// Abort running deploys when `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle one message. Returns the deploy result for `/deploy`.
    pub async fn handle(&self, text: &str, sink: &dyn ReplySink) -> Option<DeployResult> {
        let command = Command::parse(text);
        debug!(?command, "dispatching chat command");

        match command {
            Command::Deploy(job) => {
                sink.send(render::triggering(&job)).await;
                let result = self.orchestrator.run_deploy_until(job, &self.cancel).await;
                sink.send(render::deploy_result(&result)).await;
                Some(result)
            }
            Command::DeployUsage => {
                sink.send(DEPLOY_USAGE.to_string()).await;
                None
            }
            Command::Jobs => {
                let jobs = self.orchestrator.list_jobs().await;
                if let Ok(names) = &jobs {
                    info!(count = names.len(), "listed jobs");
                }
                sink.send(render::job_list(&jobs)).await;
                None
            }
            Command::Ping => {
                sink.send("pong".to_string()).await;
                None
            }
            Command::Help => {
                sink.send(HELP_TEXT.to_string()).await;
                None
            }
        }
    }
}

/// Chat reply formatting.
pub mod render {
    use super::*;

    pub fn triggering(job: &JobRef) -> String {
        match job.revision() {
            Some(rev) => format!("Triggering job [{}] at {}", job.name(), rev),
            None => format!("Triggering job [{}]", job.name()),
        }
    }

    pub fn deploy_result(result: &DeployResult) -> String {
        match result {
            DeployResult::Success { job, build } => {
                format!("Deployed job [{}], build [{}]", job.name(), build)
            }
            DeployResult::Failure { job, build, reason } => {
                let build = build
                    .as_ref()
                    .map(|b| format!(" build [{b}]"))
                    .unwrap_or_default();
                match reason {
                    DeployError::BuildFailed { result, log_tail } => format!(
                        "Job [{}]{} failed ({}). Last log lines:\n{}",
                        job.name(),
                        build,
                        result.as_deref().unwrap_or("UNKNOWN"),
                        log_tail
                    ),
                    DeployError::LogUnavailable { source, .. } => format!(
                        "Job [{}]{} failed, and its console log could not be read: {}",
                        job.name(),
                        build,
                        source
                    ),
                    other => format!(
                        "Deploy of job [{}]{} failed while {}: {}",
                        job.name(),
                        build,
                        other.stage(),
                        other
                    ),
                }
            }
        }
    }

    pub fn job_list(jobs: &Result<Vec<String>, CiError>) -> String {
        match jobs {
            Ok(names) if names.is_empty() => "No jobs found".to_string(),
            Ok(names) => names.join("\n"),
            Err(e) => format!("Could not list jobs:\n{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckhand_jenkins::{BuildNumber, LogTail};

    #[test]
    fn test_parse_deploy() {
        assert_eq!(
            Command::parse("/deploy api"),
            Command::Deploy(JobRef::new("api"))
        );
        assert_eq!(
            Command::parse("  /deploy   api   abc123  "),
            Command::Deploy(JobRef::new("api").with_revision(Some("abc123")))
        );
        assert_eq!(
            Command::parse("/deploy@deckhand_bot api abc123 extra"),
            Command::Deploy(JobRef::new("api").with_revision(Some("abc123")))
        );
        assert_eq!(Command::parse("/deploy"), Command::DeployUsage);
    }

    #[test]
    fn test_parse_other_commands() {
        assert_eq!(Command::parse("/jobs"), Command::Jobs);
        assert_eq!(Command::parse("/ping@deckhand_bot"), Command::Ping);
        assert_eq!(Command::parse("/PING"), Command::Ping);
        assert_eq!(Command::parse("/start"), Command::Help);
        assert_eq!(Command::parse("deploy api"), Command::Help);
        assert_eq!(Command::parse(""), Command::Help);
        assert_eq!(Command::parse("/"), Command::Help);
    }

    #[test]
    fn test_render_success() {
        let job = JobRef::new("api");
        let build = BuildNumber::new(job.clone(), 7).unwrap();
        let text = render::deploy_result(&DeployResult::Success { job, build });
        assert_eq!(text, "Deployed job [api], build [7]");
    }

    #[test]
    fn test_render_build_failure_includes_tail() {
        let job = JobRef::new("api");
        let build = BuildNumber::new(job.clone(), 7).unwrap();
        let result = DeployResult::Failure {
            job,
            build: Some(build),
            reason: DeployError::BuildFailed {
                result: Some("FAILURE".to_string()),
                log_tail: LogTail::from_console("step 1\nerror: boom\n", 10),
            },
        };
        let text = render::deploy_result(&result);
        assert!(text.starts_with("Job [api] build [7] failed (FAILURE)"));
        assert!(text.ends_with("step 1\nerror: boom"));
    }

    #[test]
    fn test_render_submission_failure_names_stage() {
        let result = DeployResult::Failure {
            job: JobRef::new("api"),
            build: None,
            reason: DeployError::Submission(CiError::SubmissionRejected {
                job: "api".to_string(),
                status: 500,
                body: "Internal Server Error".to_string(),
            }),
        };
        let text = render::deploy_result(&result);
        assert!(text.starts_with("Deploy of job [api] failed while submitting"));
        assert!(text.contains("500"));
    }

    #[test]
    fn test_render_job_list() {
        assert_eq!(
            render::job_list(&Ok(vec!["api".to_string(), "web".to_string()])),
            "api\nweb"
        );
        assert_eq!(render::job_list(&Ok(vec![])), "No jobs found");
        assert!(render::job_list(&Err(CiError::Http("refused".to_string())))
            .starts_with("Could not list jobs"));
    }
}
