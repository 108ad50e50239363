use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::task_waiter::WaitPolicy;

/// Clone and customize VMs from templates, as described by a YAML file.
#[derive(Debug, Parser)]
#[command(name = "vmdeploy", version)]
pub struct Cli {
    /// Deployment configuration (YAML).
    pub config: PathBuf,

    /// Backend to deploy against. `mock` is a dry run against an in-memory
    /// inventory built from the config.
    #[arg(long, value_enum, env = "VMDEPLOY_PROVIDER", default_value_t = ProviderKind::Vsphere)]
    pub provider: ProviderKind,

    /// Give up waiting on a clone task after this many seconds.
    #[arg(long, env = "VMDEPLOY_TASK_TIMEOUT_SECS", default_value_t = 3600,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub task_timeout_secs: u64,

    #[arg(long, env = "VMDEPLOY_POLL_INTERVAL_MS", default_value_t = 2000,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_ms: u64,

    /// Write the run report as JSON to this path.
    #[arg(long)]
    pub report_json: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    Vsphere,
    Mock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Vsphere => "vsphere",
            ProviderKind::Mock => "mock",
        }
    }
}

/// Exit status for a command line clap refused. `--help` and `--version`
/// come through as errors too but print to stdout and exit 0; usage errors
/// exit 1.
pub fn parse_error_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        1
    } else {
        0
    }
}

impl Cli {
    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_secs(self.task_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_wait_policy_defaults() {
        let cli = Cli::try_parse_from(["vmdeploy", "deploy.yaml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("deploy.yaml"));
        assert_eq!(cli.wait_policy(), WaitPolicy::default());
        assert!(cli.report_json.is_none());
    }

    #[test]
    fn parses_overrides() {
        let cli = Cli::try_parse_from([
            "vmdeploy",
            "deploy.yaml",
            "--provider",
            "mock",
            "--task-timeout-secs",
            "60",
            "--poll-interval-ms",
            "250",
            "--report-json",
            "out.json",
        ])
        .unwrap();
        assert_eq!(cli.provider, ProviderKind::Mock);
        assert_eq!(cli.wait_policy().timeout, Duration::from_secs(60));
        assert_eq!(cli.wait_policy().poll_interval, Duration::from_millis(250));
        assert_eq!(cli.report_json, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn config_path_is_required() {
        assert!(Cli::try_parse_from(["vmdeploy"]).is_err());
    }

    #[test]
    fn usage_errors_exit_one() {
        let err = Cli::try_parse_from(["vmdeploy"]).unwrap_err();
        assert_eq!(parse_error_exit_code(&err), 1);

        let err = Cli::try_parse_from(["vmdeploy", "x.yaml", "--provider", "xen"]).unwrap_err();
        assert_eq!(parse_error_exit_code(&err), 1);
    }

    #[test]
    fn help_and_version_exit_zero() {
        let err = Cli::try_parse_from(["vmdeploy", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert_eq!(parse_error_exit_code(&err), 0);

        let err = Cli::try_parse_from(["vmdeploy", "--version"]).unwrap_err();
        assert_eq!(parse_error_exit_code(&err), 0);
    }

    #[test]
    fn rejects_zero_timeout() {
        assert!(Cli::try_parse_from(["vmdeploy", "x.yaml", "--task-timeout-secs", "0"]).is_err());
    }
}
