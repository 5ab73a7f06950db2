//! Jenkins remote API client
//!
//! `CiClient` is the boundary between build orchestration and the network:
//! - `submit`: trigger a job, optionally with a `sha1` parameter
//! - `resolve_build_number`: turn a queue item into a build number
//! - `check_status`: poll one build
//! - `fetch_log_tail`: last lines of a build's console text
//! - `list_jobs`: names of the jobs on the server root
//!
//! `JenkinsClient` implements it over HTTP with Basic auth. Scripted fakes
//! for tests live in the `fakes` module.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tracing::{debug, info, instrument, warn};

use crate::config::JenkinsConfig;
use crate::error::{CiError, CiResult};
use crate::model::{
    BuildDetail, BuildNumber, BuildOutcome, JobRef, LogTail, QueueItem, QueueTicket, RootListing,
};

/// Longest response body kept in a `SubmissionRejected` error.
const MAX_ERROR_BODY_CHARS: usize = 800;

/// The operations build orchestration needs from a CI server.
///
/// Everything except `submit` is a read and may be retried freely.
/// Implementations must be safe to share between concurrent deploys.
#[async_trait]
pub trait CiClient: Send + Sync {
    /// Trigger a build. Not idempotent: every call queues a new build.
    async fn submit(&self, job: &JobRef) -> CiResult<QueueTicket>;

    /// Look up the build number of a queued item once. Returns
    /// `CiError::NotYetAvailable` while no executor has been assigned.
    async fn resolve_build_number(&self, ticket: &QueueTicket) -> CiResult<BuildNumber>;

    /// Current state of a build.
    async fn check_status(&self, build: &BuildNumber) -> CiResult<BuildOutcome>;

    /// Last `max_lines` lines of the build's console output.
    async fn fetch_log_tail(&self, build: &BuildNumber, max_lines: usize) -> CiResult<LogTail>;

    /// Names of all top-level jobs.
    async fn list_jobs(&self) -> CiResult<Vec<String>>;
}

/// URL layout of the Jenkins remote API.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
    job_token: String,
}

impl Endpoints {
    pub fn new(base_url: &str, job_token: &str) -> CiResult<Self> {
        let base = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| CiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(CiError::InvalidUrl(format!("{base_url} cannot be a base URL")));
        }
        Ok(Self {
            base,
            job_token: job_token.to_string(),
        })
    }

    /// `POST /job/{name}/build` or `/job/{name}/buildWithParameters`
    pub fn trigger(&self, job: &JobRef) -> CiResult<Url> {
        let action = if job.is_parameterized() {
            "buildWithParameters"
        } else {
            "build"
        };
        self.job_path(job.name(), &[action])
    }

    /// `GET {queue path}/api/json`
    ///
    /// The ticket path is a full server path, context path included.
    pub fn queue_item(&self, ticket: &QueueTicket) -> CiResult<Url> {
        let mut url = self
            .base
            .join(ticket.path())
            .map_err(|e| CiError::InvalidUrl(format!("{}: {e}", ticket.path())))?;
        url.path_segments_mut()
            .map_err(|_| self.not_a_base())?
            .pop_if_empty()
            .extend(["api", "json"]);
        Ok(url)
    }

    /// `GET /job/{name}/{number}/api/json`
    pub fn build_status(&self, build: &BuildNumber) -> CiResult<Url> {
        let number = build.value().to_string();
        self.job_path(build.job().name(), &[number.as_str(), "api", "json"])
    }

    /// `GET /job/{name}/{number}/consoleText`
    pub fn console_text(&self, build: &BuildNumber) -> CiResult<Url> {
        let number = build.value().to_string();
        self.job_path(build.job().name(), &[number.as_str(), "consoleText"])
    }

    /// `GET /api/json`
    pub fn root(&self) -> CiResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| self.not_a_base())?
            .pop_if_empty()
            .extend(["api", "json"]);
        Ok(url)
    }

    /// Path of the queue item named by a trigger response's `Location`
    /// header. Absolute and server-relative locations are both accepted.
    pub fn queue_path(&self, location: &str) -> CiResult<String> {
        let url = self
            .base
            .join(location.trim())
            .map_err(|e| CiError::InvalidUrl(format!("{location}: {e}")))?;
        Ok(url.path().to_string())
    }

    /// Job names containing `/` address jobs inside folders and are
    /// inserted segment by segment, e.g. `team/job/api`.
    fn job_path(&self, job: &str, tail: &[&str]) -> CiResult<Url> {
        let names: Vec<&str> = job
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if names.is_empty() {
            return Err(CiError::InvalidUrl("job name is empty".to_string()));
        }
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| self.not_a_base())?
            .pop_if_empty()
            .push("job")
            .extend(names)
            .extend(tail);
        url.query_pairs_mut().append_pair("token", &self.job_token);
        Ok(url)
    }

    fn not_a_base(&self) -> CiError {
        CiError::InvalidUrl(format!("{} cannot be a base URL", self.base))
    }
}

/// Jenkins client over HTTP.
pub struct JenkinsClient {
    config: JenkinsConfig,
    endpoints: Endpoints,
    http_client: reqwest::Client,
}

impl JenkinsClient {
    /// Create a new Jenkins client
    pub fn new(config: JenkinsConfig) -> CiResult<Self> {
        let endpoints = Endpoints::new(&config.base_url, &config.job_token)?;
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("deckhand/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()?;

        Ok(JenkinsClient {
            config,
            endpoints,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> CiResult<Self> {
        Self::new(JenkinsConfig::from_env()?)
    }

    pub fn config(&self) -> &JenkinsConfig {
        &self.config
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(&self.config.user, Some(&self.config.user_token))
    }

    async fn get_text(&self, url: Url) -> CiResult<String> {
        debug!(url = %redact(&url), "GET");
        let response = self.authed(self.http_client.get(url.clone())).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CiError::UnexpectedStatus {
                url: redact(&url),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl CiClient for JenkinsClient {
    #[instrument(skip(self, job), fields(job = %job))]
    async fn submit(&self, job: &JobRef) -> CiResult<QueueTicket> {
        let url = self.endpoints.trigger(job)?;
        let mut request = self.authed(self.http_client.post(url));
        if let Some(revision) = job.revision() {
            request = request.form(&[("sha1", revision)]);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), "trigger response");

        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Jenkins rejected trigger: {}", body);
            return Err(CiError::SubmissionRejected {
                job: job.name().to_string(),
                status: status.as_u16(),
                body: truncate_for_error(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| CiError::MissingLocation {
                job: job.name().to_string(),
            })?;
        let path = self.endpoints.queue_path(location)?;
        info!(queue_path = %path, "job queued");
        Ok(QueueTicket::new(job.clone(), path))
    }

    async fn resolve_build_number(&self, ticket: &QueueTicket) -> CiResult<BuildNumber> {
        let body = self.get_text(self.endpoints.queue_item(ticket)?).await?;
        let item: QueueItem = serde_json::from_str(&body)?;
        item.build_number(ticket)
    }

    async fn check_status(&self, build: &BuildNumber) -> CiResult<BuildOutcome> {
        let body = self.get_text(self.endpoints.build_status(build)?).await?;
        let detail: BuildDetail = serde_json::from_str(&body)?;
        Ok(detail.into())
    }

    async fn fetch_log_tail(&self, build: &BuildNumber, max_lines: usize) -> CiResult<LogTail> {
        let console = self.get_text(self.endpoints.console_text(build)?).await?;
        Ok(LogTail::from_console(&console, max_lines))
    }

    async fn list_jobs(&self) -> CiResult<Vec<String>> {
        let body = self.get_text(self.endpoints.root()?).await?;
        let listing: RootListing = serde_json::from_str(&body)?;
        Ok(listing.job_names())
    }
}

/// URL without its query string, so the job token never ends up in errors.
fn redact(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}

fn truncate_for_error(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> Endpoints {
        Endpoints::new("https://ci.example.com/", "j-tok").expect("endpoints")
    }

    fn build(job: &str, n: u64) -> BuildNumber {
        BuildNumber::new(JobRef::new(job), n).expect("positive")
    }

    #[test]
    fn test_trigger_without_revision_uses_build() {
        let url = endpoints().trigger(&JobRef::new("api")).unwrap();
        assert_eq!(url.as_str(), "https://ci.example.com/job/api/build?token=j-tok");

        let url = endpoints()
            .trigger(&JobRef::new("api").with_revision(Some("")))
            .unwrap();
        assert_eq!(url.path(), "/job/api/build");
    }

    #[test]
    fn test_trigger_with_revision_uses_build_with_parameters() {
        let job = JobRef::new("api").with_revision(Some("abc123"));
        let url = endpoints().trigger(&job).unwrap();
        assert_eq!(
            url.as_str(),
            "https://ci.example.com/job/api/buildWithParameters?token=j-tok"
        );
    }

    #[test]
    fn test_trigger_rejects_empty_job_name() {
        assert!(matches!(
            endpoints().trigger(&JobRef::new("  ")),
            Err(CiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_job_name_is_percent_encoded() {
        let url = endpoints().trigger(&JobRef::new("my job")).unwrap();
        assert_eq!(url.path(), "/job/my%20job/build");
    }

    #[test]
    fn test_folder_job_keeps_path_separators() {
        let url = endpoints().trigger(&JobRef::new("team/job/api")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://ci.example.com/job/team/job/api/build?token=j-tok"
        );

        let url = endpoints().console_text(&build("/team/job/api/", 4)).unwrap();
        assert_eq!(url.path(), "/job/team/job/api/4/consoleText");
    }

    #[test]
    fn test_base_with_context_path() {
        let endpoints = Endpoints::new("https://example.com/jenkins", "t").unwrap();
        let url = endpoints.build_status(&build("api", 7)).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/jenkins/job/api/7/api/json?token=t"
        );
    }

    #[test]
    fn test_queue_item_url() {
        let ticket = QueueTicket::new(JobRef::new("api"), "/queue/item/42/");
        let url = endpoints().queue_item(&ticket).unwrap();
        assert_eq!(url.as_str(), "https://ci.example.com/queue/item/42/api/json");
    }

    #[test]
    fn test_status_and_console_urls() {
        let b = build("api", 7);
        assert_eq!(
            endpoints().build_status(&b).unwrap().as_str(),
            "https://ci.example.com/job/api/7/api/json?token=j-tok"
        );
        assert_eq!(
            endpoints().console_text(&b).unwrap().as_str(),
            "https://ci.example.com/job/api/7/consoleText?token=j-tok"
        );
    }

    #[test]
    fn test_root_url_has_no_token() {
        assert_eq!(
            endpoints().root().unwrap().as_str(),
            "https://ci.example.com/api/json"
        );
    }

    #[test]
    fn test_queue_path_from_location() {
        let e = endpoints();
        assert_eq!(
            e.queue_path("https://ci.example.com/queue/item/42/").unwrap(),
            "/queue/item/42/"
        );
        assert_eq!(e.queue_path("/queue/item/42/").unwrap(), "/queue/item/42/");
    }

    #[test]
    fn test_queue_item_under_context_path() {
        let endpoints = Endpoints::new("https://example.com/jenkins", "t").unwrap();
        for location in [
            "https://example.com/jenkins/queue/item/42/",
            "/jenkins/queue/item/42/",
        ] {
            let path = endpoints.queue_path(location).unwrap();
            assert_eq!(path, "/jenkins/queue/item/42/");
            let ticket = QueueTicket::new(JobRef::new("api"), path);
            assert_eq!(
                endpoints.queue_item(&ticket).unwrap().as_str(),
                "https://example.com/jenkins/queue/item/42/api/json"
            );
        }
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            Endpoints::new("not a url", "t"),
            Err(CiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_redact_strips_token() {
        let url = endpoints().build_status(&build("api", 3)).unwrap();
        let shown = redact(&url);
        assert!(!shown.contains("j-tok"));
        assert!(shown.ends_with("/job/api/3/api/json"));
    }

    #[test]
    fn test_truncate_for_error() {
        assert_eq!(truncate_for_error("  short  ", 10), "short");
        let long = "x".repeat(20);
        assert_eq!(truncate_for_error(&long, 5), "xxxxx...");
    }

    #[test]
    fn test_client_builds_from_config() {
        let config = JenkinsConfig::new("https://ci.example.com", "bot", "u", "j");
        let client = JenkinsClient::new(config).expect("client");
        assert_eq!(client.config().user, "bot");
    }
}
