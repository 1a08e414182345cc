//! tracing subscriber setup
//!
//! Console output is compact text or JSON lines; an optional log file is
//! written through a non-blocking appender. `log` records from nokhwa and wgpu
//! arrive through tracing-subscriber's log bridge.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::{EnvFilter, ParseError};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, Layer};

/// Log filter override, e.g. `SIGN_LOG=debug,wgpu=warn`
pub const LOG_ENV: &str = "SIGN_LOG";
/// `SIGN_LOG_FORMAT=json` forces JSON console output
pub const LOG_FORMAT_ENV: &str = "SIGN_LOG_FORMAT";

const DEFAULT_FILE_NAME: &str = "sign_detection.log";

/// Keeps the file writer alive; drop it last so buffered lines are flushed
pub type LogGuard = WorkerGuard;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),
    #[error("cannot open log file: {0}")]
    File(#[from] InitError),
    #[error("a global subscriber is already installed: {0}")]
    Install(#[from] TryInitError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    /// The environment wins over the settings file when it names a format
    fn resolve(self, env_value: Option<&str>) -> Self {
        match env_value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(v) if v.eq_ignore_ascii_case("compact") || v.eq_ignore_ascii_case("text") => {
                LogFormat::Compact
            }
            _ => self,
        }
    }
}

/// `logging` section of the settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter used when neither `SIGN_LOG` nor `RUST_LOG` is set
    pub level: String,
    pub format: LogFormat,
    /// Write to stderr
    pub console: bool,
    /// Also write plain-text logs here
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info,wgpu_core=warn,wgpu_hal=warn,naga=warn".to_string(),
            format: LogFormat::Compact,
            console: true,
            file: None,
        }
    }
}

impl LogConfig {
    fn filter(&self) -> Result<EnvFilter, ParseError> {
        [LOG_ENV, "RUST_LOG"]
            .iter()
            .find_map(|var| EnvFilter::try_from_env(var).ok())
            .map_or_else(|| EnvFilter::try_new(&self.level), Ok)
    }
}

/// Split a log path into the directory and file name the appender wants
fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());
    (dir, name)
}

/// Install the global subscriber.
///
/// Hold on to the returned guard for the lifetime of the program when file
/// logging is enabled.
pub fn init_logging(config: &LogConfig) -> Result<Option<LogGuard>, LoggingError> {
    let filter = config.filter()?;
    let format = config
        .format
        .resolve(std::env::var(LOG_FORMAT_ENV).ok().as_deref());

    let console = config.console.then(|| match format {
        LogFormat::Compact => fmt::layer().with_target(true).compact().boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(false)
            .with_thread_names(true)
            .boxed(),
    });

    let (file, guard) = match &config.file {
        Some(path) => {
            let (dir, name) = split_log_path(path);
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(name)
                .build(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_names(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()?;

    tracing::debug!(
        ?format,
        file = ?config.file,
        "Logging initialized"
    );

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_format_overrides_settings() {
        assert_eq!(LogFormat::Compact.resolve(Some("JSON")), LogFormat::Json);
        assert_eq!(LogFormat::Json.resolve(Some("text")), LogFormat::Compact);
        assert_eq!(LogFormat::Json.resolve(Some("yaml")), LogFormat::Json);
        assert_eq!(LogFormat::Compact.resolve(None), LogFormat::Compact);
    }

    #[test]
    fn test_settings_section_defaults() {
        let config: LogConfig = serde_json::from_str(r#"{ "format": "json" }"#).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.console);
        assert_eq!(config.file, None);
        assert!(config.level.starts_with("info"));
    }

    #[test]
    fn test_split_log_path() {
        assert_eq!(
            split_log_path(Path::new("logs/run.log")),
            (PathBuf::from("logs"), "run.log".to_string())
        );
        assert_eq!(
            split_log_path(Path::new("run.log")),
            (PathBuf::from("."), "run.log".to_string())
        );
    }
}
