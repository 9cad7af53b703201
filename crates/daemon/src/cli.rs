//! Command-line surface
//!
//! Every option has an environment fallback; credentials and the target
//! file are prompted for when neither is given.

use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use netbackup_core::application::worker::constants::{
    DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP, DEFAULT_CYCLE_DEADLINE, DEFAULT_CYCLE_PERIOD,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_POOL_SIZE, DEFAULT_SHUTDOWN_GRACE,
};
use netbackup_core::application::{RetryPolicy, SchedulerConfig};
use netbackup_infra_ssh::SshConfig;

#[derive(Parser, Debug)]
#[command(name = "netbackup")]
#[command(about = "Periodic running-config backups over SSH", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// SSH username
    #[arg(short, long, env = "NETBACKUP_USERNAME")]
    pub username: Option<String>,

    /// SSH password
    #[arg(short, long, env = "NETBACKUP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// File with one target per line
    #[arg(short = 'f', long = "in-file", env = "NETBACKUP_TARGETS")]
    pub in_file: Option<String>,

    /// Directory receiving `{target}-{YYYY-MM-DD}` artifacts
    #[arg(short, long, env = "NETBACKUP_OUTPUT_DIR", default_value = ".")]
    pub output_dir: String,

    #[command(flatten)]
    pub tuning: Tuning,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Back up every period until Ctrl+C (default)
    Run,

    /// Run a single cycle and print its summary
    Once {
        /// Print the cycle report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load and list targets without connecting
    Check,
}

/// Scheduler, retry and transport knobs
#[derive(Args, Debug, Clone)]
pub struct Tuning {
    /// Seconds between cycle starts
    #[arg(long, default_value_t = DEFAULT_CYCLE_PERIOD.as_secs())]
    pub period_secs: u64,

    /// Maximum concurrent SSH sessions
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Connect attempts per target per cycle
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    #[arg(long, default_value_t = DEFAULT_BACKOFF_BASE.as_secs())]
    pub backoff_base_secs: u64,

    #[arg(long, default_value_t = DEFAULT_BACKOFF_CAP.as_secs())]
    pub backoff_max_secs: u64,

    /// Outstanding workers are abandoned after this many seconds
    #[arg(long, default_value_t = DEFAULT_CYCLE_DEADLINE.as_secs())]
    pub cycle_deadline_secs: u64,

    /// Seconds in-flight workers get after Ctrl+C
    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_GRACE.as_secs())]
    pub grace_secs: u64,

    /// Retrieval command for every target (overrides the per-platform default)
    #[arg(long)]
    pub command: Option<String>,

    #[arg(long, default_value_t = 30)]
    pub connect_timeout_secs: u64,

    #[arg(long, default_value_t = 120)]
    pub command_timeout_secs: u64,
}

impl Tuning {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            period: Duration::from_secs(self.period_secs),
            pool_size: self.pool_size,
            cycle_deadline: Duration::from_secs(self.cycle_deadline_secs),
            shutdown_grace: Duration::from_secs(self.grace_secs),
        }
    }

    pub fn retry_policy(&self) -> netbackup_core::Result<RetryPolicy> {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.backoff_base_secs),
            Duration::from_secs(self.backoff_max_secs),
        )
    }

    pub fn ssh_config(&self) -> SshConfig {
        SshConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["netbackup", "-f", "targets.txt"]).unwrap();

        assert_eq!(cli.command, None);
        assert_eq!(cli.output_dir, ".");
        let config = cli.tuning.scheduler_config();
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.period, Duration::from_secs(30 * 24 * 60 * 60));
        assert_eq!(cli.tuning.retry_policy().unwrap().max_attempts(), 3);
        assert_eq!(cli.tuning.ssh_config().connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_once_json_and_overrides() {
        let cli = Cli::try_parse_from([
            "netbackup",
            "-u",
            "admin",
            "-f",
            "targets.txt",
            "-o",
            "/var/backups",
            "--pool-size",
            "8",
            "--command",
            "show startup-config",
            "once",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.command, Some(Commands::Once { json: true }));
        assert_eq!(cli.username.as_deref(), Some("admin"));
        assert_eq!(cli.output_dir, "/var/backups");
        assert_eq!(cli.tuning.pool_size, 8);
        assert_eq!(cli.tuning.command.as_deref(), Some("show startup-config"));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let cli = Cli::try_parse_from(["netbackup", "--max-attempts", "0", "check"]).unwrap();
        assert!(cli.tuning.retry_policy().is_err());
    }
}
