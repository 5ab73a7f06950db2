//! Connection and credential settings for a Jenkins server.

use std::time::Duration;

use crate::error::{CiError, CiResult};

pub const ENV_URL: &str = "JENKINS_URL";
pub const ENV_USER: &str = "JENKINS_USER";
pub const ENV_USER_TOKEN: &str = "JENKINS_USER_TOKEN";
pub const ENV_JOB_TOKEN: &str = "JENKINS_JOB_TOKEN";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Jenkins configuration
#[derive(Clone)]
pub struct JenkinsConfig {
    /// Server root, e.g. `https://ci.example.com`
    pub base_url: String,
    /// Account used for HTTP Basic auth
    pub user: String,
    /// API token of `user`
    pub user_token: String,
    /// Remote trigger token configured on the jobs
    pub job_token: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl JenkinsConfig {
    pub fn new(base_url: &str, user: &str, user_token: &str, job_token: &str) -> Self {
        JenkinsConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            user_token: user_token.to_string(),
            job_token: job_token.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Read `JENKINS_URL`, `JENKINS_USER`, `JENKINS_USER_TOKEN` and
    /// `JENKINS_JOB_TOKEN` from the process environment.
    pub fn from_env() -> CiResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CiResult<Self> {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| CiError::Config(format!("{key} is not set")))
        };
        Ok(Self::new(
            &require(ENV_URL)?,
            &require(ENV_USER)?,
            &require(ENV_USER_TOKEN)?,
            &require(ENV_JOB_TOKEN)?,
        ))
    }

    /// Override the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for JenkinsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JenkinsConfig")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("user_token", &"<redacted>")
            .field("job_token", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
