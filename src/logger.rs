use std::fs;
use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Default filter when `RUST_LOG` is unset. Transport and audio-backend
/// crates are chatty at `info`.
const DEFAULT_FILTER: &str = "info,tungstenite=warn,tokio_tungstenite=warn,cpal=warn,rodio=warn";

/// Initialize the structured logging system.
///
/// Sets up:
/// - File output: `{log_dir}/promptdj.log`, daily rotation, latest 5 kept.
/// - Console output on stderr. stdout carries the IPC event stream.
/// - Environment filter: `RUST_LOG`, defaulting to [`DEFAULT_FILTER`].
///
/// If the log directory is unusable, logs go to stderr only.
pub fn init(log_dir: &Path) {
    let file_error = fs::create_dir_all(log_dir).err().map(|e| e.to_string());

    let file_appender = match file_error {
        Some(_) => None,
        None => RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("promptdj")
            .filename_suffix("log")
            .max_log_files(5)
            .build(log_dir)
            .ok(),
    };
    let file_ok = file_appender.is_some();

    let file_layer = file_appender.map(|appender| {
        fmt::layer()
            .with_writer(appender)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    });

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();
    if installed.is_err() {
        return;
    }

    if file_ok {
        tracing::info!(log_dir = %log_dir.display(), "Logger initialized");
    } else {
        tracing::warn!(
            log_dir = %log_dir.display(),
            error = file_error.as_deref().unwrap_or("appender build failed"),
            "File logging unavailable, logging to stderr only"
        );
    }
}
