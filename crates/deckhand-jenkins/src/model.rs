//! Typed view of the Jenkins objects Deckhand works with.
//!
//! Only the fields the orchestrator consumes are modeled. Unknown JSON
//! fields are ignored on decode.

use serde::{Deserialize, Serialize};

use crate::error::{CiError, CiResult};

/// Result label Jenkins reports for a green build.
pub const SUCCESS_RESULT: &str = "SUCCESS";

/// Number of console lines returned for a failed build.
pub const DEFAULT_LOG_TAIL_LINES: usize = 10;

/// Identifies what to build.
///
/// An empty or whitespace-only revision is the same as no revision and
/// selects the parameterless trigger endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobRef {
    name: String,
    revision: Option<String>,
}

impl JobRef {
    /// Reference a job without a revision parameter.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            revision: None,
        }
    }

    /// Attach the revision passed to Jenkins as the `sha1` parameter.
    pub fn with_revision(mut self, revision: Option<impl Into<String>>) -> Self {
        self.revision = revision
            .map(Into::into)
            .map(|r: String| r.trim().to_string())
            .filter(|r| !r.is_empty());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Whether the build must go through `buildWithParameters`.
    pub fn is_parameterized(&self) -> bool {
        self.revision.is_some()
    }
}

impl std::fmt::Display for JobRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.revision {
            Some(rev) => write!(f, "{}@{}", self.name, rev),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Handle on a queued build request, as returned by a trigger call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTicket {
    job: JobRef,
    path: String,
}

impl QueueTicket {
    pub fn new(job: JobRef, path: impl Into<String>) -> Self {
        Self {
            job,
            path: path.into(),
        }
    }

    pub fn job(&self) -> &JobRef {
        &self.job
    }

    /// Server-relative path of the queue item, e.g. `/queue/item/42/`.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A concrete build of a job. The number is always positive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildNumber {
    job: JobRef,
    value: u64,
}

impl BuildNumber {
    /// Returns `None` for 0, which Jenkins uses for "not assigned".
    pub fn new(job: JobRef, value: u64) -> Option<Self> {
        (value > 0).then_some(Self { job, value })
    }

    pub fn job(&self) -> &JobRef {
        &self.job
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

impl std::fmt::Display for BuildNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// One status poll of a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutcome {
    /// True only when Jenkins reported exactly `SUCCESS`.
    pub succeeded: bool,
    /// Mirrors the `building` flag, independent of `result`.
    pub still_running: bool,
    /// Raw result label (`FAILURE`, `ABORTED`, ...), kept for display.
    pub result: Option<String>,
}

/// Last lines of a build's console output, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogTail {
    lines: Vec<String>,
}

impl LogTail {
    /// Keep the last `max_lines` lines of `console`.
    pub fn from_console(console: &str, max_lines: usize) -> Self {
        let all: Vec<&str> = console.lines().collect();
        let start = all.len().saturating_sub(max_lines);
        Self {
            lines: all[start..].iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl std::fmt::Display for LogTail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.lines.join("\n"))
    }
}

// ---------------------------------------------------------------------------
// Wire schemas
// ---------------------------------------------------------------------------

/// `GET {queue item}/api/json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueItem {
    #[serde(default)]
    pub executable: Option<Executable>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Executable {
    #[serde(default)]
    pub number: u64,
}

impl QueueItem {
    /// Build number assigned to `ticket`, or `NotYetAvailable` while the
    /// item is still waiting for an executor.
    pub fn build_number(&self, ticket: &QueueTicket) -> CiResult<BuildNumber> {
        let number = self.executable.as_ref().map_or(0, |e| e.number);
        BuildNumber::new(ticket.job().clone(), number).ok_or_else(|| CiError::NotYetAvailable {
            path: ticket.path().to_string(),
        })
    }
}

/// `GET /job/{name}/{number}/api/json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildDetail {
    #[serde(default)]
    pub building: bool,
    #[serde(default)]
    pub result: Option<String>,
}

impl From<BuildDetail> for BuildOutcome {
    fn from(detail: BuildDetail) -> Self {
        BuildOutcome {
            succeeded: detail.result.as_deref() == Some(SUCCESS_RESULT),
            still_running: detail.building,
            result: detail.result,
        }
    }
}

/// `GET /api/json` on the server root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootListing {
    #[serde(default)]
    pub jobs: Vec<JobEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobEntry {
    #[serde(default)]
    pub name: String,
}

impl RootListing {
    pub fn job_names(self) -> Vec<String> {
        self.jobs
            .into_iter()
            .map(|j| j.name)
            .filter(|n| !n.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket() -> QueueTicket {
        QueueTicket::new(JobRef::new("api"), "/queue/item/42/")
    }

    #[test]
    fn test_empty_revision_is_unparameterized() {
        let job = JobRef::new("api").with_revision(Some(""));
        assert!(!job.is_parameterized());
        assert_eq!(job, JobRef::new("api"));

        let job = JobRef::new("api").with_revision(Some("   "));
        assert_eq!(job.revision(), None);

        let job = JobRef::new("api").with_revision(None::<String>);
        assert_eq!(job.revision(), None);
    }

    #[test]
    fn test_revision_is_kept() {
        let job = JobRef::new("api").with_revision(Some("abc123"));
        assert!(job.is_parameterized());
        assert_eq!(job.revision(), Some("abc123"));
        assert_eq!(job.to_string(), "api@abc123");
    }

    #[test]
    fn test_build_number_zero_is_absent() {
        assert!(BuildNumber::new(JobRef::new("api"), 0).is_none());
        let build = BuildNumber::new(JobRef::new("api"), 7).expect("positive");
        assert_eq!(build.value(), 7);
        assert_eq!(build.job().name(), "api");
    }

    #[test]
    fn test_queue_item_without_executable_not_yet_available() {
        let item: QueueItem = serde_json::from_str(r#"{"id": 42, "why": "Waiting"}"#).unwrap();
        let err = item.build_number(&ticket()).unwrap_err();
        assert!(matches!(err, CiError::NotYetAvailable { ref path } if path == "/queue/item/42/"));

        let item: QueueItem = serde_json::from_str(r#"{"executable": null}"#).unwrap();
        assert!(item.build_number(&ticket()).is_err());
    }

    #[test]
    fn test_queue_item_zero_number_not_yet_available() {
        let item: QueueItem =
            serde_json::from_str(r#"{"executable": {"number": 0, "url": ""}}"#).unwrap();
        assert!(item.build_number(&ticket()).unwrap_err().is_transient());
    }

    #[test]
    fn test_queue_item_positive_number_resolves() {
        let item: QueueItem = serde_json::from_str(
            r#"{"executable": {"number": 7, "url": "http://ci/job/api/7/"}, "blocked": false}"#,
        )
        .unwrap();
        let build = item.build_number(&ticket()).expect("resolved");
        assert_eq!(build.value(), 7);
        assert_eq!(build.job(), &JobRef::new("api"));
    }

    #[test]
    fn test_outcome_success_only_on_exact_label() {
        let outcome: BuildOutcome = serde_json::from_str::<BuildDetail>(
            r#"{"building": false, "result": "SUCCESS", "number": 7}"#,
        )
        .unwrap()
        .into();
        assert!(outcome.succeeded);
        assert!(!outcome.still_running);

        for label in ["FAILURE", "UNSTABLE", "ABORTED", "NOT_BUILT", "success"] {
            let outcome = BuildOutcome::from(BuildDetail {
                building: false,
                result: Some(label.to_string()),
            });
            assert!(!outcome.succeeded, "{label} must not count as success");
        }

        let outcome: BuildOutcome = serde_json::from_str::<BuildDetail>(r#"{"result": null}"#)
            .unwrap()
            .into();
        assert!(!outcome.succeeded);
    }

    #[test]
    fn test_outcome_running_independent_of_result() {
        let outcome = BuildOutcome::from(BuildDetail {
            building: true,
            result: Some("SUCCESS".to_string()),
        });
        assert!(outcome.succeeded);
        assert!(outcome.still_running);

        let outcome = BuildOutcome::from(BuildDetail {
            building: false,
            result: None,
        });
        assert!(!outcome.succeeded);
        assert!(!outcome.still_running);
    }

    #[test]
    fn test_log_tail_keeps_last_lines_in_order() {
        let console: String = (1..=25).map(|i| format!("line {i}\n")).collect();
        let tail = LogTail::from_console(&console, DEFAULT_LOG_TAIL_LINES);
        assert_eq!(tail.len(), 10);
        assert_eq!(tail.lines().first().map(String::as_str), Some("line 16"));
        assert_eq!(tail.lines().last().map(String::as_str), Some("line 25"));
    }

    #[test]
    fn test_log_tail_short_console() {
        let tail = LogTail::from_console("Started\r\nFinished: FAILURE\r\n", 10);
        assert_eq!(tail.lines(), ["Started", "Finished: FAILURE"]);
        assert_eq!(tail.to_string(), "Started\nFinished: FAILURE");

        assert!(LogTail::from_console("", 10).is_empty());
    }

    #[test]
    fn test_root_listing_job_names() {
        let listing: RootListing = serde_json::from_str(
            r#"{"_class": "hudson.model.Hudson", "jobs": [
                {"name": "api", "color": "blue"},
                {"name": "web", "url": "http://ci/job/web/"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(listing.job_names(), vec!["api", "web"]);

        let empty: RootListing = serde_json::from_str("{}").unwrap();
        assert!(empty.job_names().is_empty());
    }
}
