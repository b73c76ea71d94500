// Logging for hostcompat
// Structured logging with timestamp formatting and multiple output formats
//
// Supports:
// - Text and JSON output
// - Console, file, or both destinations
// - Independent log levels for console and file output
// - Timestamps formatted as YYYY-MM-DD HH:mm:ss
// - JSON entries carrying the log target and an optional detail field
//
// Example usage:
// ```
// let config = LogConfig {
//     console_level: LevelFilter::Info,
//     file_level: Some(LevelFilter::Debug),
//     format: LogFormat::Json,
//     destination: LogDestination::Both(PathBuf::from("hostcompat.log")),
// };
// init_logger(config)?;
// log::info!("Probe started");
// ```

use log::{Level, LevelFilter};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use crate::compat::diagnostics::DIAGNOSTICS_TARGET;

/// Log output format options
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {}. Valid options: text, json", s)),
        }
    }
}

/// Log destination options
#[derive(Debug, Clone, PartialEq)]
pub enum LogDestination {
    Console,
    File(PathBuf),
    Both(PathBuf),
}

/// JSON log entry structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonLogEntry {
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub console_level: LevelFilter,
    pub file_level: Option<LevelFilter>,
    pub format: LogFormat,
    pub destination: LogDestination,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_level: LevelFilter::Info,
            file_level: None,
            format: LogFormat::Text,
            destination: LogDestination::Console,
        }
    }
}

/// Logger writing to stderr and/or an append-only file
pub struct CompatLogger {
    config: LogConfig,
    file_lock: Mutex<()>,
}

impl CompatLogger {
    pub fn new(config: LogConfig) -> Self {
        Self { config, file_lock: Mutex::new(()) }
    }

    fn format_timestamp() -> String {
        let now: DateTime<Local> = Local::now();
        now.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    fn format_text_message(&self, level: Level, target: &str, message: &str) -> String {
        let timestamp = Self::format_timestamp();
        if target == DIAGNOSTICS_TARGET {
            format!("{} [{}] [compat] {}", timestamp, level.to_string().to_uppercase(), message)
        } else {
            format!("{} [{}] {}", timestamp, level.to_string().to_uppercase(), message)
        }
    }

    fn format_json_message(&self, level: Level, target: &str, message: &str) -> Result<String> {
        let detail = (target == DIAGNOSTICS_TARGET).then(|| serde_json::json!({ "category": "compatibility" }));
        let entry = JsonLogEntry {
            timestamp: Self::format_timestamp(),
            level: level.to_string().to_uppercase(),
            target: target.to_string(),
            message: message.to_string(),
            detail,
        };

        serde_json::to_string(&entry).context("Failed to serialize log entry to JSON")
    }

    fn should_log_to_console(&self, level: Level) -> bool {
        level <= self.config.console_level
    }

    fn should_log_to_file(&self, level: Level) -> bool {
        self.config.file_level.map(|file_level| level <= file_level).unwrap_or(false)
    }

    fn write_to_console(&self, formatted_message: &str) -> Result<()> {
        writeln!(io::stderr(), "{}", formatted_message).context("Failed to write to console")
    }

    fn write_to_file(&self, formatted_message: &str, file_path: &Path) -> Result<()> {
        let _guard = self.file_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)
            .with_context(|| format!("Failed to open log file: {}", file_path.display()))?;

        writeln!(file, "{}", formatted_message).context("Failed to write to log file")
    }
}

impl log::Log for CompatLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.should_log_to_console(metadata.level()) || self.should_log_to_file(metadata.level())
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let message = record.args().to_string();
        let level = record.level();
        let target = record.target();

        let formatted_message = match self.config.format {
            LogFormat::Text => self.format_text_message(level, target, &message),
            LogFormat::Json => match self.format_json_message(level, target, &message) {
                Ok(json) => json,
                Err(e) => {
                    eprintln!("JSON formatting error: {}. Falling back to text format.", e);
                    self.format_text_message(level, target, &message)
                }
            },
        };

        match &self.config.destination {
            LogDestination::Console => {
                if self.should_log_to_console(level) {
                    if let Err(e) = self.write_to_console(&formatted_message) {
                        eprintln!("Console logging error: {}", e);
                    }
                }
            }
            LogDestination::File(path) => {
                if self.should_log_to_file(level) {
                    if let Err(e) = self.write_to_file(&formatted_message, path) {
                        eprintln!("File logging error: {}. Falling back to console.", e);
                        if let Err(console_err) = self.write_to_console(&formatted_message) {
                            eprintln!("Console fallback error: {}", console_err);
                        }
                    }
                }
            }
            LogDestination::Both(path) => {
                if self.should_log_to_console(level) {
                    if let Err(e) = self.write_to_console(&formatted_message) {
                        eprintln!("Console logging error: {}", e);
                    }
                }
                if self.should_log_to_file(level) {
                    if let Err(e) = self.write_to_file(&formatted_message, path) {
                        eprintln!("File logging error: {}", e);
                    }
                }
            }
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

/// Initialize the logging system with the given configuration
pub fn init_logger(config: LogConfig) -> Result<()> {
    let max_level = match config.file_level {
        Some(file_level) => file_level.max(config.console_level),
        None => config.console_level,
    };

    log::set_boxed_logger(Box::new(CompatLogger::new(config))).context("Failed to set global logger")?;
    log::set_max_level(max_level);

    Ok(())
}

/// Convert string to LevelFilter
pub fn parse_log_level(level_str: &str) -> Result<LevelFilter> {
    match level_str.to_lowercase().as_str() {
        "error" => Ok(LevelFilter::Error),
        "warn" => Ok(LevelFilter::Warn),
        "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        "trace" => Ok(LevelFilter::Trace),
        "off" => Ok(LevelFilter::Off),
        _ => Err(anyhow::anyhow!(
            "Invalid log level: {}. Valid levels: error, warn, info, debug, trace, off",
            level_str
        )),
    }
}
