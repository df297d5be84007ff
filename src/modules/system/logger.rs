use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::AppResult;

const LOG_FILE_PREFIX: &str = "hub.log";
const MAX_TOTAL_SIZE_BYTES: u64 = 512 * 1024 * 1024;
const TARGET_SIZE_BYTES: u64 = 256 * 1024 * 1024;

struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(w, "{}", now.to_rfc3339())
    }
}

pub fn get_log_dir(data_dir: &Path) -> AppResult<PathBuf> {
    let log_dir = data_dir.join("logs");
    if !log_dir.exists() {
        fs::create_dir_all(&log_dir)?;
    }
    Ok(log_dir)
}

/// Console plus daily-rolling file output, filtered by `RUST_LOG` (default `info`).
pub fn init_logger(data_dir: &Path) {
    let _ = tracing_log::LogTracer::init();

    let log_dir = match get_log_dir(data_dir) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Failed to initialize log directory: {}", e);
            return;
        }
    };
    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let console_layer = fmt::Layer::new()
        .with_target(false)
        .with_level(true)
        .with_timer(LocalTimer);
    let file_layer = fmt::Layer::new()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_timer(LocalTimer);
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(console_layer)
        .with(file_layer)
        .try_init();
    // The writer must outlive every log call for the rest of the process.
    std::mem::forget(guard);

    info!("Log system initialized (console + {})", log_dir.display());
}

/// Applies the configured retention to `<data_dir>/logs`.
pub fn prune_logs(data_dir: &Path, retention_days: u64) {
    let result = get_log_dir(data_dir).and_then(|dir| cleanup_old_logs(&dir, retention_days));
    match result {
        Ok(0) => {}
        Ok(n) => info!("Removed {} old log file(s)", n),
        Err(e) => warn!("Failed to cleanup old logs: {}", e),
    }
}

/// Deletes log files older than `days_to_keep`, then the oldest remaining
/// files while the directory is above its size budget.
pub fn cleanup_old_logs(log_dir: &Path, days_to_keep: u64) -> AppResult<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let cutoff = now.saturating_sub(days_to_keep * 24 * 60 * 60);

    let mut entries = Vec::new();
    for entry in fs::read_dir(log_dir)?.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Ok(metadata) = fs::metadata(&path) {
            let modified = metadata
                .modified()
                .ok()
                .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(now);
            entries.push((path, metadata.len(), modified));
        }
    }

    let mut deleted = 0;
    let mut remaining = Vec::new();
    for (path, size, modified) in entries {
        if modified < cutoff {
            match fs::remove_file(&path) {
                Ok(()) => deleted += 1,
                Err(e) => {
                    warn!("Failed to delete old log file {:?}: {}", path, e);
                    remaining.push((path, size, modified));
                }
            }
        } else {
            remaining.push((path, size, modified));
        }
    }

    let mut total: u64 = remaining.iter().map(|(_, size, _)| *size).sum();
    if total > MAX_TOTAL_SIZE_BYTES {
        remaining.sort_by_key(|(_, _, modified)| *modified);
        for (path, size, _) in remaining {
            if total <= TARGET_SIZE_BYTES {
                break;
            }
            if fs::remove_file(&path).is_ok() {
                deleted += 1;
                total -= size;
            }
        }
    }
    Ok(deleted)
}
