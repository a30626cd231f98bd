/// Structured logging for the survey import service
///
/// Installs a `tracing` subscriber writing to the console and, optionally,
/// appending to a log file for scheduled runs. Also provides the import
/// audit log: one summary per district plus a closing report of every
/// invalid row.

use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::prelude::*;

use crate::error::LoggingError;
use crate::model::{ImportResult, InvalidRecord};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

/// Installs the global subscriber.
///
/// Console output always; when `log_file` is given, entries are also
/// appended there without ANSI colours. Fails if a subscriber is already
/// installed.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<&Path>,
    console_timestamps: bool,
) -> Result<(), LoggingError> {
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::File {
                    path: path.display().to_string(),
                    source,
                })?;
            Some(tracing_fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    let (timed_console, plain_console) = if console_timestamps {
        (Some(tracing_fmt::layer().with_target(false)), None)
    } else {
        (None, Some(tracing_fmt::layer().with_target(false).without_time()))
    };

    tracing_subscriber::registry()
        .with(LevelFilter::from(min_level))
        .with(timed_console)
        .with(plain_console)
        .with(file_layer)
        .try_init()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Import summary logging
// ---------------------------------------------------------------------------

/// One-line summary of a district import.
pub fn summary_line(district: &str, result: &ImportResult) -> String {
    format!(
        "District {}: {} inserted, {} duplicates, {} invalid ({} measurements, {} interpolations)",
        district,
        result.success_count,
        result.duplicate_count,
        result.invalid_records.len(),
        result.raw_measurement_count,
        result.interpolation_count
    )
}

/// Logs a district summary at a level matching how well it went.
pub fn log_import_summary(district: &str, result: &ImportResult) {
    let message = summary_line(district, result);
    if result.invalid_records.is_empty() {
        info!("{}", message);
    } else if result.success_count == 0 && result.duplicate_count == 0 {
        error!("{}", message);
    } else {
        warn!("{}", message);
    }
}

/// Collects per-district results for one batch run and writes the closing
/// invalid-row report.
#[derive(Debug, Default)]
pub struct ImportLog {
    results: Vec<(String, ImportResult)>,
    failures: Vec<(String, String)>,
}

impl ImportLog {
    pub fn new() -> Self {
        info!("Began logging");
        Self::default()
    }

    /// Logs the district's summary line and keeps its result for the
    /// closing report.
    pub fn add_result(&mut self, district: &str, result: ImportResult) {
        log_import_summary(district, &result);
        self.results.push((district.to_string(), result));
    }

    /// Records a district whose import aborted.
    pub fn add_failure(&mut self, district: &str, reason: impl fmt::Display) {
        error!("Survey '{}' failed: {}", district, reason);
        self.failures.push((district.to_string(), reason.to_string()));
    }

    /// Invalid rows of every district that had any, as one report.
    /// `None` when the batch had no invalid rows.
    pub fn invalid_rows_report(&self) -> Option<String> {
        let with_invalid: Vec<(&String, &Vec<InvalidRecord>)> = self
            .results
            .iter()
            .filter(|(_, r)| !r.invalid_records.is_empty())
            .map(|(d, r)| (d, &r.invalid_records))
            .collect();
        if with_invalid.is_empty() {
            return None;
        }

        let mut report = String::new();
        for (district, rows) in with_invalid {
            report.push_str(&format!("\n\nSURVEY ID: {}", district));
            for row in rows {
                report.push_str(&format!("\n   -- HydrologyID: {} -- {}", row.record_id, row.message));
            }
            report.push('\n');
        }
        Some(report)
    }

    pub fn finalize(self) {
        if let Some(report) = self.invalid_rows_report() {
            error!("{}", report);
        }
        if !self.failures.is_empty() {
            warn!("{} of {} surveys failed", self.failures.len(), self.failures.len() + self.results.len());
        }
        info!("Ended logging");
    }
}
