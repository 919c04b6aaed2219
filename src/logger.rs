//! Logging: the [`Logger`] capability used by the engine, and the process-wide
//! `tracing` subscriber.
//!
//! The subscriber writes to stderr and to a session log file that is
//! **truncated at each launch**, so it only ever holds the latest session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\SciiPaint\sciipaint.log`
//!   Linux:    `~/.local/share/SciiPaint/sciipaint.log`
//!   macOS:    `~/Library/Application Support/SciiPaint/sciipaint.log`

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Note,
    General,
    Critical,
}

/// Key/value pairs attached to a log message.
pub type LogArguments = Vec<(&'static str, String)>;

/// Where the engine reports what it does. Arguments are built lazily so a
/// disabled logger costs nothing.
pub trait Logger: Send + Sync {
    fn is_enabled(&self, severity: Severity) -> bool;

    fn log(&self, severity: Severity, message: &str, arguments: LogArguments);

    fn trace(&self, message: &str, arguments: &dyn Fn() -> LogArguments) {
        if self.is_enabled(Severity::Trace) {
            self.log(Severity::Trace, message, arguments());
        }
    }

    fn note(&self, message: &str, arguments: &dyn Fn() -> LogArguments) {
        if self.is_enabled(Severity::Note) {
            self.log(Severity::Note, message, arguments());
        }
    }

    fn critical(&self, message: &str, arguments: &dyn Fn() -> LogArguments) {
        if self.is_enabled(Severity::Critical) {
            self.log(Severity::Critical, message, arguments());
        }
    }
}

fn join_arguments(arguments: &LogArguments) -> String {
    struct Joined<'a>(&'a LogArguments);

    impl fmt::Display for Joined<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            for (i, (key, value)) in self.0.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}={}", key, value)?;
            }
            Ok(())
        }
    }

    Joined(arguments).to_string()
}

/// Forwards to `tracing`: trace → TRACE, note → DEBUG, general → INFO, critical → ERROR.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn is_enabled(&self, severity: Severity) -> bool {
        match severity {
            Severity::Trace => tracing::enabled!(Level::TRACE),
            Severity::Note => tracing::enabled!(Level::DEBUG),
            Severity::General => tracing::enabled!(Level::INFO),
            Severity::Critical => tracing::enabled!(Level::ERROR),
        }
    }

    fn log(&self, severity: Severity, message: &str, arguments: LogArguments) {
        let arguments = join_arguments(&arguments);
        match severity {
            Severity::Trace => tracing::trace!(%arguments, "{}", message),
            Severity::Note => tracing::debug!(%arguments, "{}", message),
            Severity::General => tracing::info!(%arguments, "{}", message),
            Severity::Critical => tracing::error!(%arguments, "{}", message),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn is_enabled(&self, _severity: Severity) -> bool {
        false
    }

    fn log(&self, _severity: Severity, _message: &str, _arguments: LogArguments) {}
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<(Severity, String, String)>>,
}

impl MemoryLogger {
    /// Recorded `(severity, message, joined arguments)` triples.
    pub fn entries(&self) -> Vec<(Severity, String, String)> {
        self.entries.lock().map(|entries| entries.clone()).unwrap_or_default()
    }
}

impl Logger for MemoryLogger {
    fn is_enabled(&self, _severity: Severity) -> bool {
        true
    }

    fn log(&self, severity: Severity, message: &str, arguments: LogArguments) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((severity, message.to_string(), join_arguments(&arguments)));
        }
    }
}

/// Install the global subscriber. Must be called once, before any logging.
///
/// * `RUST_LOG` directives are honoured alongside `level`.
/// * With `to_file`, creates (or truncates) the session log file and installs a
///   panic hook that records the panic before running the default handler.
pub fn init(level: Level, to_file: bool) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let file = if to_file { open_session_file() } else { None };

    let installed = match file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::io::stderr.and(Mutex::new(file)))
            .try_init(),
        None => tracing_subscriber::fmt().with_env_filter(filter).with_ansi(false).with_writer(std::io::stderr).try_init(),
    };

    if installed.is_err() {
        // Another subscriber is already active (tests, embedding).
        return;
    }

    if let Some(path) = log_path() {
        tracing::info!(path = %path.display(), "session log started");

        let prev = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!("PANIC: {}", info);
            prev(info);
        }));
    }
}

fn open_session_file() -> Option<File> {
    let path = log_file_path();

    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
        Ok(file) => {
            let _ = LOG_PATH.set(path);
            Some(file)
        }
        Err(e) => {
            // Can't open log file: not fatal, stderr still works
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            None
        }
    }
}

fn log_file_path() -> PathBuf {
    data_dir().join("SciiPaint").join("sciipaint.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}
