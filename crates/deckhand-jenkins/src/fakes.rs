//! In-memory fakes for `CiClient` (testing only)
//!
//! `ScriptedCiClient` answers each operation from a per-job script and
//! records every call, so tests can assert both outcomes and call order
//! without a Jenkins server. Responses go through the same decoding rules
//! as `JenkinsClient` (queue number 0 is "not yet available", only
//! `SUCCESS` succeeds, console text is tailed line by line).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::client::CiClient;
use crate::error::{CiError, CiResult};
use crate::model::{
    BuildDetail, BuildNumber, BuildOutcome, Executable, JobRef, LogTail, QueueItem, QueueTicket,
};

/// One recorded call against the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CiCall {
    Submit(JobRef),
    Resolve { job: String, path: String },
    Status { job: String, number: u64 },
    FetchLog { job: String, number: u64, max_lines: usize },
    ListJobs,
}

impl CiCall {
    /// Job the call was made for, if any.
    pub fn job(&self) -> Option<&str> {
        match self {
            CiCall::Submit(job) => Some(job.name()),
            CiCall::Resolve { job, .. }
            | CiCall::Status { job, .. }
            | CiCall::FetchLog { job, .. } => Some(job),
            CiCall::ListJobs => None,
        }
    }
}

/// Queue of scripted responses. The last one repeats once the rest are used.
#[derive(Debug)]
struct Script<T> {
    responses: VecDeque<CiResult<T>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            responses: VecDeque::new(),
        }
    }
}

impl<T: Clone> Script<T> {
    fn push(&mut self, response: CiResult<T>) {
        self.responses.push_back(response);
    }

    fn next(&mut self, what: &str) -> CiResult<T> {
        match self.responses.len() {
            0 => Err(CiError::Http(format!("no scripted {what} response"))),
            1 => self.responses[0].clone(),
            _ => self
                .responses
                .pop_front()
                .unwrap_or_else(|| Err(CiError::Http(format!("no scripted {what} response")))),
        }
    }
}

#[derive(Debug, Default)]
struct JobScript {
    submit: Script<String>,
    queue: Script<u64>,
    status: Script<BuildDetail>,
    console: Script<String>,
}

/// Scripted `CiClient` keyed by job name.
#[derive(Debug, Default)]
pub struct ScriptedCiClient {
    scripts: Mutex<HashMap<String, JobScript>>,
    jobs: Mutex<Script<Vec<String>>>,
    calls: Mutex<Vec<CiCall>>,
    latency: Option<Duration>,
}

impl ScriptedCiClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long (tokio time) inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Accept the trigger and hand out `queue_path` as the queue item.
    pub fn accept_submit(&self, job: &str, queue_path: &str) -> &Self {
        self.script(job, |s| s.submit.push(Ok(queue_path.to_string())))
    }

    /// Reject the trigger with an HTTP status.
    pub fn reject_submit(&self, job: &str, status: u16, body: &str) -> &Self {
        let err = CiError::SubmissionRejected {
            job: job.to_string(),
            status,
            body: body.to_string(),
        };
        self.script(job, |s| s.submit.push(Err(err)))
    }

    /// Queue-item answers in order; `0` means no executor yet.
    pub fn queue_numbers(&self, job: &str, numbers: &[u64]) -> &Self {
        self.script(job, |s| {
            for n in numbers {
                s.queue.push(Ok(*n));
            }
        })
    }

    pub fn queue_error(&self, job: &str, err: CiError) -> &Self {
        self.script(job, |s| s.queue.push(Err(err)))
    }

    /// One status poll reporting the build as still running.
    pub fn status_running(&self, job: &str) -> &Self {
        self.status(job, true, None)
    }

    /// One status poll reporting a finished build with `result`.
    pub fn status_finished(&self, job: &str, result: Option<&str>) -> &Self {
        self.status(job, false, result)
    }

    pub fn status_error(&self, job: &str, err: CiError) -> &Self {
        self.script(job, |s| s.status.push(Err(err)))
    }

    pub fn console(&self, job: &str, text: &str) -> &Self {
        self.script(job, |s| s.console.push(Ok(text.to_string())))
    }

    pub fn console_error(&self, job: &str, err: CiError) -> &Self {
        self.script(job, |s| s.console.push(Err(err)))
    }

    pub fn job_listing(&self, result: CiResult<Vec<String>>) -> &Self {
        self.jobs.lock().unwrap().push(result);
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<CiCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls made for one job, in order.
    pub fn calls_for(&self, job: &str) -> Vec<CiCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.job() == Some(job))
            .collect()
    }

    fn status(&self, job: &str, building: bool, result: Option<&str>) -> &Self {
        let detail = BuildDetail {
            building,
            result: result.map(str::to_string),
        };
        self.script(job, |s| s.status.push(Ok(detail)))
    }

    fn script(&self, job: &str, f: impl FnOnce(&mut JobScript)) -> &Self {
        let mut scripts = self.scripts.lock().unwrap();
        f(scripts.entry(job.to_string()).or_default());
        self
    }

    fn next<T>(&self, job: &str, f: impl FnOnce(&mut JobScript) -> CiResult<T>) -> CiResult<T> {
        let mut scripts = self.scripts.lock().unwrap();
        f(scripts.entry(job.to_string()).or_default())
    }

    async fn record(&self, call: CiCall) {
        self.calls.lock().unwrap().push(call);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl CiClient for ScriptedCiClient {
    async fn submit(&self, job: &JobRef) -> CiResult<QueueTicket> {
        self.record(CiCall::Submit(job.clone())).await;
        let path = self.next(job.name(), |s| s.submit.next("submit"))?;
        Ok(QueueTicket::new(job.clone(), path))
    }

    async fn resolve_build_number(&self, ticket: &QueueTicket) -> CiResult<BuildNumber> {
        let job = ticket.job().name();
        self.record(CiCall::Resolve {
            job: job.to_string(),
            path: ticket.path().to_string(),
        })
        .await;
        let number = self.next(job, |s| s.queue.next("queue"))?;
        let item = QueueItem {
            executable: Some(Executable { number }),
        };
        item.build_number(ticket)
    }

    async fn check_status(&self, build: &BuildNumber) -> CiResult<BuildOutcome> {
        let job = build.job().name();
        self.record(CiCall::Status {
            job: job.to_string(),
            number: build.value(),
        })
        .await;
        let detail = self.next(job, |s| s.status.next("status"))?;
        Ok(detail.into())
    }

    async fn fetch_log_tail(&self, build: &BuildNumber, max_lines: usize) -> CiResult<LogTail> {
        let job = build.job().name();
        self.record(CiCall::FetchLog {
            job: job.to_string(),
            number: build.value(),
            max_lines,
        })
        .await;
        let console = self.next(job, |s| s.console.next("console"))?;
        Ok(LogTail::from_console(&console, max_lines))
    }

    async fn list_jobs(&self) -> CiResult<Vec<String>> {
        self.record(CiCall::ListJobs).await;
        self.jobs.lock().unwrap().next("job listing")
    }
}
