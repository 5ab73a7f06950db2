//! Deckhand - chat-driven deploy relay for Jenkins
//!
//! The `deckhand` command triggers Jenkins jobs and reports how they ended.
//!
//! ## Commands
//!
//! - `deploy`: trigger one job and wait for its build
//! - `jobs`: list the jobs on the server
//! - `chat`: read chat commands (`/deploy`, `/jobs`, `/ping`) from stdin,
//!   one per line, and write replies to stdout

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use deckhand_core::dispatch::render;
use deckhand_core::{
    cancellation, init_tracing, CancelHandle, Dispatcher, Orchestrator, OrchestratorConfig,
    PollPolicy, ReplySink, METRICS,
};
use deckhand_jenkins::{JenkinsClient, JenkinsConfig, JobRef, DEFAULT_LOG_TAIL_LINES};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Trigger Jenkins jobs from chat and report the result", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    jenkins: JenkinsArgs,

    #[command(flatten)]
    polling: PollingArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct JenkinsArgs {
    /// Jenkins server root URL
    #[arg(long = "jenkins-url", env = "JENKINS_URL", global = true)]
    url: Option<String>,

    /// Jenkins account used for API calls
    #[arg(long = "jenkins-user", env = "JENKINS_USER", global = true)]
    user: Option<String>,

    /// API token of the Jenkins account
    #[arg(
        long = "jenkins-user-token",
        env = "JENKINS_USER_TOKEN",
        hide_env_values = true,
        global = true
    )]
    user_token: Option<String>,

    /// Remote trigger token configured on the jobs
    #[arg(
        long = "jenkins-job-token",
        env = "JENKINS_JOB_TOKEN",
        hide_env_values = true,
        global = true
    )]
    job_token: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30", global = true)]
    request_timeout_secs: u64,
}

#[derive(Args)]
struct PollingArgs {
    /// Seconds between queue and status polls
    #[arg(long, default_value = "5", global = true)]
    poll_interval_secs: u64,

    /// Give up a polling loop after this many attempts (default: never)
    #[arg(long, global = true)]
    max_polls: Option<u32>,

    /// Give up a polling loop after this many seconds (default: never)
    #[arg(long, global = true)]
    deadline_secs: Option<u64>,

    /// Console lines shown for a failed build
    #[arg(long, default_value_t = DEFAULT_LOG_TAIL_LINES, global = true)]
    log_lines: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger a job and wait for its build to finish
    Deploy {
        /// Job name
        job: String,

        /// Revision passed to the job as the `sha1` parameter
        revision: Option<String>,

        /// Print the result as JSON instead of a chat message
        #[arg(long)]
        output_json: bool,
    },

    /// List all jobs on the server
    Jobs,

    /// Serve chat commands read from stdin, one message per line
    Chat,
}

impl JenkinsArgs {
    fn to_config(&self) -> Result<JenkinsConfig> {
        let url = self.url.as_deref().context("JENKINS_URL / --jenkins-url is required")?;
        let user = self
            .user
            .as_deref()
            .context("JENKINS_USER / --jenkins-user is required")?;
        let user_token = self
            .user_token
            .as_deref()
            .context("JENKINS_USER_TOKEN / --jenkins-user-token is required")?;
        let job_token = self
            .job_token
            .as_deref()
            .context("JENKINS_JOB_TOKEN / --jenkins-job-token is required")?;

        Ok(JenkinsConfig::new(url, user, user_token, job_token)
            .with_timeout(Duration::from_secs(self.request_timeout_secs.max(1))))
    }
}

impl PollingArgs {
    fn to_config(&self) -> OrchestratorConfig {
        let mut policy = PollPolicy::fixed(Duration::from_secs(self.poll_interval_secs));
        if let Some(max) = self.max_polls {
            policy = policy.with_max_attempts(max);
        }
        if let Some(secs) = self.deadline_secs {
            policy = policy.with_deadline(Duration::from_secs(secs));
        }
        OrchestratorConfig {
            log_tail_lines: self.log_lines,
            ..OrchestratorConfig::default()
        }
        .with_poll_policy(policy)
    }
}

/// Chat replies go to stdout, one block per message.
struct StdoutSink;

#[async_trait]
impl ReplySink for StdoutSink {
    async fn send(&self, text: String) {
        println!("{text}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    let config = cli.jenkins.to_config()?;
    info!(jenkins = %config.base_url, user = %config.user, "using Jenkins server");
    let client = JenkinsClient::new(config).context("failed to create Jenkins client")?;
    let orchestrator = Orchestrator::with_config(Arc::new(client), cli.polling.to_config());

    match cli.command {
        Commands::Deploy {
            job,
            revision,
            output_json,
        } => cmd_deploy(orchestrator, JobRef::new(job).with_revision(revision), output_json).await,
        Commands::Jobs => cmd_jobs(orchestrator).await,
        Commands::Chat => cmd_chat(orchestrator).await,
    }
}

async fn cmd_deploy(orchestrator: Orchestrator, job: JobRef, output_json: bool) -> Result<()> {
    let (handle, signal) = cancellation();
    cancel_on_ctrl_c(handle);

    if !output_json {
        println!("{}", render::triggering(&job));
    }
    let result = orchestrator.run_deploy_until(job, &signal).await;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&result.summary())?);
    } else {
        println!("{}", render::deploy_result(&result));
    }
    METRICS.flush();

    if let Some(reason) = result.reason() {
        bail!("deploy of {} failed while {}", result.job(), reason.stage());
    }
    Ok(())
}

async fn cmd_jobs(orchestrator: Orchestrator) -> Result<()> {
    let jobs = orchestrator.list_jobs().await.context("failed to list jobs")?;
    for name in jobs {
        println!("{name}");
    }
    Ok(())
}

async fn cmd_chat(orchestrator: Orchestrator) -> Result<()> {
    let (handle, signal) = cancellation();
    let dispatcher = Dispatcher::new(orchestrator).with_cancel(signal.clone());
    let sink = Arc::new(StdoutSink);
    let mut tasks = JoinSet::new();

    info!("reading chat commands from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, cancelling running deploys");
                handle.cancel();
                break;
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        // Each message runs on its own task so a long deploy does not
        // block /ping or /jobs.
        let dispatcher = dispatcher.clone();
        let sink = Arc::clone(&sink);
        tasks.spawn(async move {
            dispatcher.handle(&line, sink.as_ref()).await;
        });
    }

    if !signal.is_cancelled() {
        cancel_on_ctrl_c(handle);
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "chat task failed");
        }
    }
    METRICS.flush();
    Ok(())
}

fn cancel_on_ctrl_c(handle: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling deploy");
            handle.cancel();
        }
    });
}
