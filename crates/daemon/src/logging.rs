//! Logging setup
//!
//! - `RUST_LOG` filters (default `netbackup=info`)
//! - `NETBACKUP_LOG_FORMAT=json` switches stderr output to JSON lines
//! - `NETBACKUP_LOG_DIR` adds a daily rolling JSON file

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Prefix match: also covers netbackup_core and the infra crates
const DEFAULT_FILTER: &str = "netbackup=info";
const LOG_FORMAT_ENV: &str = "NETBACKUP_LOG_FORMAT";
const LOG_DIR_ENV: &str = "NETBACKUP_LOG_DIR";
const LOG_FILE_PREFIX: &str = "netbackup.log";

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop; hold it for the
/// lifetime of the process.
pub fn init_logging() -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create log filter")?;

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let dir = shellexpand::tilde(dir.trim()).into_owned();
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    // stdout stays free for command output (`once --json`)
    let installed = if json_requested(std::env::var(LOG_FORMAT_ENV).ok().as_deref()) {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init()
    };
    installed.context("Failed to install log subscriber")?;

    Ok(guard)
}

fn json_requested(format: Option<&str>) -> bool {
    matches!(format, Some(f) if f.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_requested() {
        assert!(json_requested(Some("json")));
        assert!(json_requested(Some("JSON")));
        assert!(!json_requested(Some("pretty")));
        assert!(!json_requested(None));
    }
}
