//! Command-line interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "flake-triage", version, about = "Triage flaky CI failures on pull requests")]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, global = true, default_value = "flake-triage.yaml")]
    pub config: PathBuf,

    /// Issue-tracker API token.
    #[arg(long, env = "GITHUB_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Triage failing build URLs for one PR and report back on it.
    Triage {
        /// PR number the failing builds belong to.
        #[arg(long)]
        pr: u64,

        /// Failing build URLs, one or more.
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Crawl one job's build history and dump its failures as JSON.
    Crawl {
        /// CI job name.
        #[arg(long)]
        job: String,
    },

    /// Build the known-issue index and dump it as JSON.
    Index,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_triage_invocation() {
        let cli = Cli::parse_from([
            "flake-triage",
            "--config",
            "cfg.yaml",
            "triage",
            "--pr",
            "1234",
            "https://ci.example.io/job/J/1/",
        ]);
        assert_eq!(cli.config, PathBuf::from("cfg.yaml"));
        match cli.command {
            Command::Triage { pr, urls } => {
                assert_eq!(pr, 1234);
                assert_eq!(urls.len(), 1);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_crawl_invocation() {
        let cli = Cli::parse_from(["flake-triage", "crawl", "--job", "Widgets-Master-K8s"]);
        match cli.command {
            Command::Crawl { job } => assert_eq!(job, "Widgets-Master-K8s"),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
