// SPDX-License-Identifier: Apache-2.0

//! Logging and observability helpers.

pub mod sensitive;

pub use sensitive::Sensitive;

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;

const LOG_FILE_PREFIX: &str = "veilsql.log";
const DEFAULT_FILTER: &str = "veilsql=info,veil_sql=info";

/// Installs the global JSON subscriber. Later calls are no-ops.
pub fn init_tracing(config: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.filter.as_deref().unwrap_or(DEFAULT_FILTER))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_current_span(true)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE);

    match &config.log_dir {
        Some(log_dir) => {
            if let Err(e) = fs::create_dir_all(log_dir) {
                eprintln!("Failed to create log directory {}: {}", log_dir.display(), e);
            }
            if let Err(e) = cleanup_old_logs(log_dir, config.retention_days) {
                eprintln!("Failed to clean up old logs: {}", e);
            }

            let file_appender: RollingFileAppender =
                tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
            let _ = builder.with_writer(file_appender).try_init();
            tracing::info!("Tracing initialized. Logs directory: {:?}", log_dir);
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}

/// Removes rolled log files older than `retention_days`.
pub fn cleanup_old_logs(log_dir: &Path, retention_days: u64) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let retention = Duration::from_secs(retention_days * 24 * 60 * 60);
    let mut removed = 0;

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        if !is_log {
            continue;
        }

        let age = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > retention) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("Failed to remove old log file {:?}: {}", path, e),
            }
        }
    }

    Ok(removed)
}
