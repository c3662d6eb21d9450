//! Logging configuration using tracing

use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Environment variable controlling the log filter.
pub const LOG_ENV: &str = "CBRIDGE_LOG";

/// Filter used when `CBRIDGE_LOG` is unset or invalid. `cbridge` is the
/// binary target.
pub const DEFAULT_FILTER: &str = "cbridge=info,cbridge_core=info,cbridge_link=info,cbridge_app=info,warn";

const LOG_FILE_PREFIX: &str = "cbridge.log";

/// Initialize the logging subsystem
///
/// Logs are written to `~/.local/share/companion-bridge/logs/`
/// Log level is controlled by the `CBRIDGE_LOG` environment variable.
///
/// # Examples
/// ```bash
/// CBRIDGE_LOG=debug cbridge run
/// CBRIDGE_LOG=cbridge_link=trace cbridge run
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);

    let env_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!("Companion bridge starting, logs in {}", log_dir.display());

    Ok(())
}

/// Get the log directory path
fn get_log_directory() -> Result<PathBuf> {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    Ok(base.join("companion-bridge").join("logs"))
}

/// Get the log file path for the current day.
///
/// The daily appender suffixes the prefix with the UTC date.
pub fn get_current_log_file() -> Result<PathBuf> {
    let dir = get_log_directory()?;
    Ok(dir.join(log_file_name(Utc::now().date_naive())))
}

fn log_file_name(date: NaiveDate) -> String {
    format!("{}.{}", LOG_FILE_PREFIX, date.format("%Y-%m-%d"))
}
