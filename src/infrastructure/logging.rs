//! Logging Module
//!
//! Installs the global `tracing` subscriber from [`LogSettings`]: an
//! `EnvFilter` (`RUST_LOG` wins over the configured level), an optional
//! console layer and an optional rolling log file.

use crate::domain::settings::LogSettings;
use anyhow::Context;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Keep alive for as long as log lines should reach the file
pub struct LoggingGuard {
    _guards: Vec<WorkerGuard>,
}

/// File rotation by name; unknown names fall back to daily
pub fn rotation_from_str(name: &str) -> Rotation {
    match name.to_lowercase().as_str() {
        "hourly" => Rotation::HOURLY,
        "minutely" => Rotation::MINUTELY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

fn env_filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// `<log_dir>/<prefix>.<date>.log`, written from a background worker
fn file_writer(settings: &LogSettings) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    let appender = RollingFileAppender::builder()
        .rotation(rotation_from_str(&settings.rotation))
        .filename_prefix(settings.file_name_prefix.as_str())
        .filename_suffix("log")
        .build(&settings.log_dir)
        .with_context(|| format!("cannot open log directory {}", settings.log_dir))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Install the global subscriber
///
/// Fails if the log directory cannot be opened or a global subscriber is
/// already set.
pub fn init_logger(settings: &LogSettings) -> anyhow::Result<LoggingGuard> {
    let mut guards = Vec::new();

    let console_layer = settings.console_logging_enabled.then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_file(settings.show_file_line)
            .with_line_number(settings.show_file_line)
            .with_thread_ids(settings.show_thread_ids)
            .with_target(settings.show_target)
            .with_ansi(settings.ansi_colors)
    });

    let file_layer = if settings.file_logging_enabled {
        let (writer, guard) = file_writer(settings)?;
        guards.push(guard);
        Some(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_file(settings.show_file_line)
                .with_line_number(settings.show_file_line)
                .with_thread_ids(settings.show_thread_ids)
                .with_target(settings.show_target),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter(settings))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    tracing::info!(
        "Logging initialized (level {}, file logging {})",
        settings.level,
        settings.file_logging_enabled
    );

    Ok(LoggingGuard { _guards: guards })
}
