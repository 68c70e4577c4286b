//! Tracing subscriber setup: console output plus an optional daily rolling file.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "resale-catalog.log";

/// Builds the level filter. `RUST_LOG` wins over the configured level.
///
/// Query logging from sqlx is kept at warn unless asked for explicitly.
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(format!("{},sqlx=warn", level))
        .with_context(|| format!("invalid log level: {}", level))
}

/// Installs the global subscriber. The returned guard must live as long as the
/// process, or buffered file output is lost.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(&config.level)?;

    let (file_layer, guard) = if config.file_enabled {
        std::fs::create_dir_all(&config.directory)
            .with_context(|| format!("failed to create log directory {}", config.directory))?;
        let appender = rolling::daily(&config.directory, LOG_FILE_PREFIX);
        let (writer, guard) = non_blocking(appender);
        let layer = fmt::layer().with_ansi(false).with_target(true).with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if config.json {
        registry.with(fmt::layer().json().with_current_span(false)).try_init()?;
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()?;
    }

    Ok(guard)
}
