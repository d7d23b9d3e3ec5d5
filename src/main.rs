//! flake-triage binary: batch client for the triage engine.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use flake_triage::ci::{crawl, jenkins::JenkinsClient, CiServer};
use flake_triage::cli::{Cli, Command};
use flake_triage::config::FlakeConfig;
use flake_triage::tracker::github::GithubClient;
use flake_triage::tracker::index::build_known_issue_index;
use flake_triage::tracker::IssueTracker;
use flake_triage::triage::TriageEngine;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = FlakeConfig::load(&cli.config)
        .with_context(|| format!("load config {}", cli.config.display()))?;

    match cli.command {
        Command::Triage { pr, urls } => {
            let ci = ci_client(&cfg)?;
            let tracker = tracker_client(&cfg, cli.token.as_deref())?;
            let mut engine = TriageEngine::new(ci, tracker, cfg).await?;
            engine.triage_batch(pr, &urls).await?;
        }
        Command::Crawl { job } => {
            let ci = ci_client(&cfg)?;
            let failures = crawl::crawl_job(&ci, &job).await?;
            serde_json::to_writer_pretty(io::stdout().lock(), &failures)?;
            println!();
        }
        Command::Index => {
            let tracker = tracker_client(&cfg, cli.token.as_deref())?;
            let index = build_known_issue_index(
                tracker.as_ref(),
                &cfg.issue_tracker.bot_login,
                &cfg.issue_tracker.issue_labels,
            )
            .await?;
            serde_json::to_writer_pretty(io::stdout().lock(), &index)?;
            println!();
        }
    }
    Ok(())
}

fn ci_client(cfg: &FlakeConfig) -> Result<Arc<dyn CiServer>> {
    if cfg.ci.ci_url.is_empty() {
        bail!("ci-url is not set in the configuration");
    }
    Ok(Arc::new(JenkinsClient::new(cfg.ci.ci_url.clone())?))
}

fn tracker_client(cfg: &FlakeConfig, token: Option<&str>) -> Result<Arc<dyn IssueTracker>> {
    let (owner, repo) = cfg.repository()?;
    let Some(token) = token else {
        bail!("no issue-tracker token; set GITHUB_TOKEN or pass --token");
    };
    Ok(Arc::new(GithubClient::new(owner, repo, token)?))
}
