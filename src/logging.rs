use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub const LOG_DIR: &str = "logs";

/// Dependencies that are chatty at debug level.
const QUIET_TARGETS: [&str; 5] = [
    "hyper=warn",
    "reqwest=info",
    "html5ever=warn",
    "selectors=warn",
    "rustls=warn",
];

pub fn log_file_name(started_at: DateTime<Local>) -> String {
    format!("scraping_{}.log", started_at.format("%Y%m%d_%H%M%S"))
}

/// Build the filter: `RUST_LOG` wins when set, otherwise `info` (or `debug`
/// when verbose) with noisy dependencies held back.
pub fn env_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };

    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();
    }

    QUIET_TARGETS
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(EnvFilter::default().add_directive(level.into()), |filter, directive| {
            filter.add_directive(directive)
        })
}

/// Install the global subscriber: console on stdout plus a plain-text file
/// under `log_dir`. The returned guard must be held until exit so buffered
/// lines reach the file.
pub fn init(verbose: bool, log_dir: &Path, started_at: DateTime<Local>) -> Result<(WorkerGuard, PathBuf)> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let file_name = log_file_name(started_at);
    let (file_writer, guard) = non_blocking(rolling::never(log_dir, &file_name));

    let file_layer = fmt::Layer::new()
        .with_writer(file_writer)
        .with_target(true)
        .with_ansi(false);
    let console_layer = fmt::Layer::new()
        .with_writer(std::io::stdout)
        .with_target(false);

    Registry::default()
        .with(env_filter(verbose))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok((guard, log_dir.join(file_name)))
}
