//! # Logging Utilities
//!
//! Logging infrastructure for symdex using `tracing`.
//!
//! This module provides structured logging with support for:
//! - Two output formats (JSON for machines, pretty for people)
//! - Environment variable configuration
//! - Log level filtering
//! - Console (stderr) and rolling file output
//!
//! Console output goes to stderr so that symbol listings written to stdout
//! stay clean when piped.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use symdex_utils::init_logging;
//!
//! // Initialize with default settings (reads from RUST_LOG env var)
//! init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level filter (e.g., `RUST_LOG=debug`, `RUST_LOG=symdex_core=trace`)
//! - `SYMDEX_LOG_FORMAT`: Set output format (`json` or `pretty`, default: `pretty`)
//! - `SYMDEX_LOG_FILE`: Optional path to a log file, rolled daily
//!
//! ## Examples
//!
//! ```rust,no_run
//! use symdex_utils::{init_logging_with_level, LogFormat, LogLevel};
//!
//! init_logging_with_level(LogLevel::Debug, LogFormat::Json).expect("Failed to initialize logging");
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "SYMDEX_LOG_FORMAT";
/// Environment variable naming an optional log file.
pub const LOG_FILE_ENV: &str = "SYMDEX_LOG_FILE";

// Flushes buffered file output on exit; must outlive the subscriber.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default)
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    /// Default
    Info,
    Debug,
    /// Most verbose; includes per-query events from the symbol table
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Unknown log level: {s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            )),
        }
    }
}

/// Initialize logging with default settings
///
/// Reads configuration from environment variables:
/// - `RUST_LOG`: Log level filter (e.g., `debug`, `symdex_core=debug`)
/// - `SYMDEX_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
/// - `SYMDEX_LOG_FILE`: Optional path to log file
///
/// ## Errors
///
/// Returns an error if:
/// - Logging is already initialized
/// - `SYMDEX_LOG_FORMAT` holds an unknown format
pub fn init_logging() -> Result<(), LoggingError>
{
    let format = match env::var(LOG_FORMAT_ENV) {
        Ok(value) => LogFormat::from_str(&value).map_err(LoggingError::InvalidFormat)?,
        Err(_) => LogFormat::Pretty,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));
    init_subscriber(format, filter, true, env::var(LOG_FILE_ENV).ok().map(PathBuf::from))
}

/// Initialize logging with explicit level and format
///
/// `SYMDEX_LOG_FILE` is still honoured.
///
/// ## Errors
///
/// Returns an error if logging is already initialized.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    let filter = EnvFilter::new(Level::from(level).to_string());
    init_subscriber(format, filter, true, env::var(LOG_FILE_ENV).ok().map(PathBuf::from))
}

/// Initialize file-only logging
///
/// Nothing is written to the console. The log file is
/// `~/.symdex/YYYY-MM-DD-symdex.log`, or the same name under the system
/// temporary directory when `HOME` is not set.
///
/// `level` overrides `RUST_LOG`; with neither the level is `INFO`.
///
/// ## Errors
///
/// Returns an error if logging is already initialized or the log directory
/// cannot be created.
pub fn init_logging_to_file(level: Option<LogLevel>, format: LogFormat) -> Result<PathBuf, LoggingError>
{
    let log_file = default_log_file()?;

    let filter = match (level, env::var("RUST_LOG")) {
        (Some(level), _) => EnvFilter::new(Level::from(level).to_string()),
        (None, Ok(rust_log)) => EnvFilter::try_new(&rust_log).unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
        (None, Err(_)) => EnvFilter::new(Level::INFO.to_string()),
    };

    init_subscriber(format, filter, false, Some(log_file.clone()))?;
    Ok(log_file)
}

fn default_log_file() -> Result<PathBuf, LoggingError>
{
    let today = Utc::now().format("%Y-%m-%d");
    let dir = match env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".symdex"),
        Err(_) => env::temp_dir(),
    };
    std::fs::create_dir_all(&dir).map_err(LoggingError::FileError)?;
    Ok(dir.join(format!("{today}-symdex.log")))
}

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool, filter: EnvFilter) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339());

    match format {
        LogFormat::Pretty => base.with_ansi(ansi).with_filter(filter).boxed(),
        LogFormat::Json => base
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn file_layer(format: LogFormat, path: &Path, filter: EnvFilter) -> BoxedLayer
{
    let file_appender = tracing_appender::rolling::daily(
        path.parent().unwrap_or_else(|| Path::new(".")),
        path.file_name().unwrap_or_default(),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // A second init fails in try_init below, so a lost race here is harmless.
    let _ = FILE_GUARD.set(guard);
    format_layer(format, non_blocking, false, filter)
}

fn init_subscriber(format: LogFormat, filter: EnvFilter, console: bool, log_file: Option<PathBuf>) -> Result<(), LoggingError>
{
    let mut layers: Vec<BoxedLayer> = Vec::new();
    if console {
        layers.push(format_layer(format, io::stderr, true, filter.clone()));
    }
    if let Some(path) = log_file {
        layers.push(file_layer(format, &path, filter));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
