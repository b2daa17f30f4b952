//! File logging for project commands
//!
//! Each command that runs inside a project appends to a rotating
//! `kitshare_rCURRENT.log` under `.kitshare/logs/`. Records carry
//! `event=<name> key=value` metadata only, never participant names or contact
//! details.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::info;
use miette::Diagnostic;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use thiserror::Error;

const LOG_FILE_BASENAME: &str = "kitshare";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;

/// Accepted `log_level` values, `warning` being an alias of `warn`
pub const LOG_LEVELS: &[&str] = &["off", "error", "warn", "warning", "info", "debug", "trace"];

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();

struct ActiveLogger {
    level: &'static str,
    log_dir: PathBuf,
    _handle: LoggerHandle,
}

#[derive(Debug, Error, Diagnostic)]
pub enum LoggingError {
    #[error("invalid log level '{0}'")]
    #[diagnostic(
        code(kitshare::logging::level),
        help("use one of: off, error, warn, info, debug, trace")
    )]
    InvalidLevel(String),

    #[error("log directory must be absolute: {}", .0.display())]
    #[diagnostic(code(kitshare::logging::relative_dir))]
    RelativeDir(PathBuf),

    #[error("cannot create log directory {}", path.display())]
    #[diagnostic(code(kitshare::logging::create_dir))]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot start the logger")]
    #[diagnostic(code(kitshare::logging::start))]
    Start(#[from] flexi_logger::FlexiLoggerError),

    #[error("logging already writes to {} at level {level}", log_dir.display())]
    #[diagnostic(code(kitshare::logging::already_started))]
    AlreadyStarted { level: &'static str, log_dir: PathBuf },
}

/// Canonical name of a configured log level
pub fn parse_level(level: &str) -> Result<&'static str, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" => Ok("off"),
        "error" => Ok("error"),
        "warn" | "warning" => Ok("warn"),
        "info" => Ok("info"),
        "debug" => Ok("debug"),
        "trace" => Ok("trace"),
        _ => Err(LoggingError::InvalidLevel(level.to_string())),
    }
}

/// Start logging to `log_dir`
///
/// Starting again with the same level and directory does nothing. A process
/// only ever logs to one place, so any other combination is an error.
pub fn init_logging(level: &str, log_dir: &Path) -> Result<(), LoggingError> {
    let level = parse_level(level)?;
    if !log_dir.is_absolute() {
        return Err(LoggingError::RelativeDir(log_dir.to_path_buf()));
    }

    let active = ACTIVE.get_or_try_init(|| -> Result<ActiveLogger, LoggingError> {
        std::fs::create_dir_all(log_dir).map_err(|source| LoggingError::CreateDir {
            path: log_dir.to_path_buf(),
            source,
        })?;

        let handle = Logger::try_with_str(level)?
            .log_to_file(
                FileSpec::default()
                    .directory(log_dir)
                    .basename(LOG_FILE_BASENAME),
            )
            .rotate(
                Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                Naming::Numbers,
                Cleanup::KeepLogFiles(MAX_LOG_FILES),
            )
            .write_mode(WriteMode::BufferAndFlush)
            .append()
            .format_for_files(flexi_logger::detailed_format)
            .start()?;

        info!(
            "event=logging_start module=core version={} level={}",
            env!("CARGO_PKG_VERSION"),
            level
        );
        Ok(ActiveLogger {
            level,
            log_dir: log_dir.to_path_buf(),
            _handle: handle,
        })
    })?;

    if active.level != level || active.log_dir != log_dir {
        return Err(LoggingError::AlreadyStarted {
            level: active.level,
            log_dir: active.log_dir.clone(),
        });
    }
    Ok(())
}

/// Level and directory of the running logger, if any
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE
        .get()
        .map(|active| (active.level, active.log_dir.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("INFO").unwrap(), "info");
        assert_eq!(parse_level(" warning ").unwrap(), "warn");
        for level in LOG_LEVELS {
            assert!(parse_level(level).is_ok());
        }
        assert!(matches!(
            parse_level("loud"),
            Err(LoggingError::InvalidLevel(l)) if l == "loud"
        ));
    }

    #[test]
    fn test_relative_dir_rejected() {
        let err = init_logging("info", Path::new("logs/dev")).unwrap_err();
        assert!(matches!(err, LoggingError::RelativeDir(_)));
    }

    #[test]
    fn test_start_once_per_process() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("logs");
        let other = tmp.path().join("other");

        init_logging("info", &dir).unwrap();
        init_logging("INFO", &dir).unwrap();
        assert!(std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with(LOG_FILE_BASENAME)));

        assert!(matches!(
            init_logging("debug", &dir),
            Err(LoggingError::AlreadyStarted { level: "info", .. })
        ));
        assert!(matches!(
            init_logging("info", &other),
            Err(LoggingError::AlreadyStarted { .. })
        ));

        let (level, active_dir) = logging_status().unwrap();
        assert_eq!(level, "info");
        assert_eq!(active_dir, dir);
    }
}
