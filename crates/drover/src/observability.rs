//! Structured logging for release runs.
//!
//! Every run appends JSON lines to a daily rolling file so a release can be
//! audited after the fact: which command ran, which step touched which
//! module, and what each external tool said. Stdout is left alone; it carries
//! command output and `--json` reports.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const ENV_LOG_PATH: &str = "DROVER_LOG_PATH";
const ENV_LOG_DIR: &str = "DROVER_LOG_DIR";
const SYSTEM_LOG_DIR: &str = "/var/log";
const LOG_FILE_NAME: &str = "drover.jsonl";

/// Crates whose debug output `-v` turns on.
const OWN_TARGETS: &[&str] = &["drover", "drover_core"];

/// Where a log file may go, in priority order.
#[derive(Clone, Debug, Default)]
pub struct LogSources {
    /// `DROVER_LOG_PATH`: an exact file.
    pub path: Option<PathBuf>,
    /// `DROVER_LOG_DIR`.
    pub dir: Option<PathBuf>,
    /// `log_dir` from the loaded configuration.
    pub config_dir: Option<PathBuf>,
    /// Fallback directories tried when nothing above is set.
    pub fallbacks: Vec<PathBuf>,
}

impl LogSources {
    /// Read the environment, then add the configured directory and the
    /// platform fallbacks (`/var/log`, the data dir, the working directory).
    pub fn from_env(config_dir: Option<PathBuf>) -> Self {
        let mut fallbacks = Vec::new();
        if cfg!(unix) {
            fallbacks.push(PathBuf::from(SYSTEM_LOG_DIR));
        }
        if let Some(dirs) = directories::ProjectDirs::from("", "", env!("CARGO_PKG_NAME")) {
            fallbacks.push(dirs.data_local_dir().join("logs"));
        }
        if let Ok(cwd) = std::env::current_dir() {
            fallbacks.push(cwd);
        }

        Self {
            path: std::env::var_os(ENV_LOG_PATH).map(PathBuf::from),
            dir: std::env::var_os(ENV_LOG_DIR).map(PathBuf::from),
            config_dir,
            fallbacks,
        }
    }

    /// Pick the destination.
    ///
    /// An explicit path or directory that cannot be written is not skipped
    /// silently: logging falls back to stderr with the reason attached.
    fn resolve(&self) -> LogDestination {
        if let Some(path) = &self.path {
            return match split_file_path(path) {
                Ok((dir, file_name)) => LogDestination::file(dir, file_name),
                Err(reason) => LogDestination::Stderr { reason },
            };
        }
        if let Some(dir) = self.dir.as_ref().or(self.config_dir.as_ref()) {
            return LogDestination::file(dir.clone(), LOG_FILE_NAME.to_string());
        }
        self.fallbacks
            .iter()
            .find(|dir| writable(dir, LOG_FILE_NAME).is_ok())
            .map_or_else(
                || LogDestination::Stderr {
                    reason: "no writable log directory found".to_string(),
                },
                |dir| LogDestination::File {
                    dir: dir.clone(),
                    file_name: LOG_FILE_NAME.to_string(),
                },
            )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum LogDestination {
    File { dir: PathBuf, file_name: String },
    Stderr { reason: String },
}

impl LogDestination {
    fn file(dir: PathBuf, file_name: String) -> Self {
        match writable(&dir, &file_name) {
            Ok(()) => Self::File { dir, file_name },
            Err(reason) => Self::Stderr { reason },
        }
    }

    fn writer(&self) -> (NonBlocking, WorkerGuard) {
        match self {
            Self::File { dir, file_name } => {
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name))
            }
            Self::Stderr { reason } => {
                eprintln!("Warning: {reason}; logging to stderr");
                tracing_appender::non_blocking(std::io::stderr())
            }
        }
    }
}

/// Keeps the background log writer alive; flushes on drop.
pub struct LogGuard {
    _worker: WorkerGuard,
}

/// Install the global subscriber.
///
/// Returns a guard that must be held until the process exits.
pub fn init(sources: &LogSources, filter: EnvFilter) -> anyhow::Result<LogGuard> {
    let (writer, worker) = sources.resolve().writer();

    let json = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_ansi(false)
        .with_current_span(true)
        .with_span_list(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .try_init()?;

    Ok(LogGuard { _worker: worker })
}

/// Build the level filter.
///
/// `--quiet` wins over `-v`, which wins over `RUST_LOG`, which wins over the
/// configured level. `-v` raises only drover's own targets; `-vv` traces
/// everything.
pub fn env_filter(quiet: bool, verbose: u8, configured: &str) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }
    match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured)),
        1 => {
            let own: Vec<String> = OWN_TARGETS.iter().map(|t| format!("{t}=debug")).collect();
            EnvFilter::new(format!("{configured},{}", own.join(",")))
        }
        _ => EnvFilter::new("trace"),
    }
}

fn split_file_path(path: &Path) -> Result<(PathBuf, String), String> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format!("{ENV_LOG_PATH} must end in a UTF-8 file name"))?
        .to_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, file_name))
}

fn writable(dir: &Path, file_name: &str) -> Result<(), String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("cannot create log directory {}: {e}", dir.display()))?;
    let path = dir.join(file_name);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map(drop)
        .map_err(|e| format!("cannot open log file {}: {e}", path.display()))
}
