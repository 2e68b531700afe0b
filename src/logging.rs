use crate::error::IntakeError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{
    fmt::{self},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// One line of the activity log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub component: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

const ACTIVITY_LOG_FILE: &str = "activity.log";
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const MAX_LOG_BACKUPS: u32 = 5;

static LOGS_DIR: OnceLock<PathBuf> = OnceLock::new();

// Keep the guard alive for the lifetime of the program
static FILE_APPENDER_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    OnceLock::new();

// Serializes activity-log appends and rotation
static ACTIVITY_LOG_LOCK: Mutex<()> = Mutex::new(());

/// Install console + file tracing layers and enable the activity log.
/// Only the first call has any effect.
pub fn init_logging(logs_dir: &Path) -> Result<(), IntakeError> {
    if LOGS_DIR.get().is_some() {
        return Ok(());
    }

    std::fs::create_dir_all(logs_dir)?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Console logging - compact format
    let console_layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_filter(env_filter.clone());

    let file_appender = tracing_appender::rolling::never(logs_dir, "intake.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| IntakeError::Other(format!("Failed to initialize logging: {}", e)))?;

    let _ = FILE_APPENDER_GUARD.set(guard);
    let _ = LOGS_DIR.set(logs_dir.to_path_buf());

    Ok(())
}

pub fn log_intake_event(
    component: &str,
    level: &str,
    message: &str,
    details: Option<serde_json::Value>,
) -> Result<(), IntakeError> {
    match level {
        "ERROR" => error!(component = component, "{}", message),
        "WARN" => warn!(component = component, "{}", message),
        "DEBUG" => debug!(component = component, "{}", message),
        _ => info!(component = component, "{}", message),
    }

    // Activity log is only written once logging is initialised
    let Some(logs_dir) = LOGS_DIR.get() else {
        return Ok(());
    };

    let entry = LogEntry {
        timestamp: Utc::now().to_rfc3339(),
        level: level.to_string(),
        component: component.to_string(),
        message: message.to_string(),
        details,
    };

    append_log_entry(&logs_dir.join(ACTIVITY_LOG_FILE), &entry)
}

fn append_log_entry(log_file_path: &Path, entry: &LogEntry) -> Result<(), IntakeError> {
    let _guard = ACTIVITY_LOG_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if should_rotate_log(log_file_path)? {
        rotate_log_file(log_file_path)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)?;

    writeln!(file, "{}", serde_json::to_string(entry)?)?;
    file.flush()?;

    Ok(())
}

fn should_rotate_log(log_file_path: &Path) -> Result<bool, IntakeError> {
    if !log_file_path.exists() {
        return Ok(false);
    }
    Ok(std::fs::metadata(log_file_path)?.len() > MAX_LOG_SIZE)
}

fn rotate_log_file(log_file_path: &Path) -> Result<(), IntakeError> {
    // Shift backups up by one (4 -> 5, 3 -> 4, ...); the oldest is overwritten
    for i in (1..MAX_LOG_BACKUPS).rev() {
        let current_backup = log_file_path.with_extension(format!("log.{}", i));
        let next_backup = log_file_path.with_extension(format!("log.{}", i + 1));

        if current_backup.exists() {
            std::fs::rename(&current_backup, &next_backup)?;
        }
    }

    if log_file_path.exists() {
        std::fs::rename(log_file_path, log_file_path.with_extension("log.1"))?;
    }

    Ok(())
}

/// Newest-first entries from the activity log in `logs_dir`
pub fn read_activity_log(
    logs_dir: &Path,
    max_lines: Option<usize>,
) -> Result<Vec<LogEntry>, IntakeError> {
    let log_file_path = logs_dir.join(ACTIVITY_LOG_FILE);

    if !log_file_path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(&log_file_path)?);
    let mut entries = Vec::new();

    for line in reader.lines() {
        // Partial or foreign lines are skipped
        if let Ok(entry) = serde_json::from_str::<LogEntry>(&line?) {
            entries.push(entry);
        }
    }

    entries.reverse();

    if let Some(max) = max_lines {
        entries.truncate(max);
    }

    Ok(entries)
}

// Convenience functions for different log levels
pub fn log_debug(component: &str, message: &str) -> Result<(), IntakeError> {
    log_intake_event(component, "DEBUG", message, None)
}

pub fn log_info(component: &str, message: &str) -> Result<(), IntakeError> {
    log_intake_event(component, "INFO", message, None)
}

pub fn log_warn(component: &str, message: &str) -> Result<(), IntakeError> {
    log_intake_event(component, "WARN", message, None)
}

pub fn log_error(component: &str, message: &str) -> Result<(), IntakeError> {
    log_intake_event(component, "ERROR", message, None)
}

pub fn log_with_details(
    component: &str,
    level: &str,
    message: &str,
    details: serde_json::Value,
) -> Result<(), IntakeError> {
    log_intake_event(component, level, message, Some(details))
}
