//! Logging setup for geotrack.
//!
//! - Writes to `~/.geotrack/logs/geotrack.log` (cleared on session start)
//! - Optionally mirrors to stdout
//! - `RUST_LOG` overrides the level unless debug is forced

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard will flush and close the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Where and how loudly to log.
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    pub file: PathBuf,
    /// Mirror log lines to stdout.
    pub stdout: bool,
    /// Force debug level, ignoring `RUST_LOG`.
    pub debug: bool,
}

impl LoggingOptions {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            stdout: false,
            debug: false,
        }
    }

    pub fn with_stdout(mut self, stdout: bool) -> Self {
        self.stdout = stdout;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Initialize the global subscriber.
///
/// Creates the log directory if needed and clears the previous log file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot
/// be cleared.
pub fn init_logging(options: &LoggingOptions) -> Result<LoggingGuard, io::Error> {
    let (log_dir, log_file) = prepare_log_file(&options.file)?;

    let file_appender = tracing_appender::rolling::never(&log_dir, &log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    let stdout_layer = options.stdout.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stdout)
            .with_ansi(true)
            .compact()
            .boxed()
    });

    tracing_subscriber::registry()
        .with(build_filter(options.debug))
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Level filter: debug when forced, else `RUST_LOG`, else info.
fn build_filter(debug: bool) -> EnvFilter {
    if debug {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Create the parent directory, truncate the file, and split the path.
fn prepare_log_file(path: &Path) -> io::Result<(PathBuf, OsString)> {
    let log_file = path
        .file_name()
        .map(|name| name.to_os_string())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("log path has no file name: {}", path.display()),
            )
        })?;

    let log_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    fs::create_dir_all(&log_dir)?;
    fs::write(path, "")?;

    Ok((log_dir, log_file))
}

/// Default log directory (~/.geotrack/logs).
pub fn default_log_dir() -> PathBuf {
    crate::config::config_directory().join("logs")
}

/// Default log file name.
pub fn default_log_file() -> &'static str {
    crate::config::DEFAULT_LOG_FILE_NAME
}
