//! Structured logging setup.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to every
//! target.  With a log file configured, output is appended to that file
//! (without ANSI colours) instead of going to stderr.  Logging is diagnostic
//! only: nothing in the relay depends on whether it is initialised.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::infrastructure::storage::config::LoggingSection;

/// Error type for logging setup.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("unknown log level {0:?} (expected error, warn, info, debug, trace or off)")]
    InvalidLevel(String),
    #[error("cannot open log file {path}: {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Installs the global `tracing` subscriber.
///
/// Calling this more than once is harmless; later calls leave the first
/// subscriber in place.
///
/// # Errors
///
/// Returns [`LoggingError`] if the level is not recognised or the log file
/// cannot be opened.
pub fn init_logging(config: &LoggingSection) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::default().add_directive(parse_level(&config.level)?.into()),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match &config.file {
        Some(path) => {
            let file = open_log_file(path)?;
            let _ = builder
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init();
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
    Ok(())
}

fn parse_level(level: &str) -> Result<LevelFilter, LoggingError> {
    level
        .trim()
        .parse::<LevelFilter>()
        .map_err(|_| LoggingError::InvalidLevel(level.to_string()))
}

fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::OpenFile {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_accepts_standard_names() {
        assert_eq!(parse_level("info").unwrap(), LevelFilter::INFO);
        assert_eq!(parse_level("DEBUG").unwrap(), LevelFilter::DEBUG);
        assert_eq!(parse_level(" warn ").unwrap(), LevelFilter::WARN);
        assert_eq!(parse_level("off").unwrap(), LevelFilter::OFF);
    }

    #[test]
    fn test_parse_level_rejects_unknown_name() {
        let err = parse_level("chatty").unwrap_err();
        assert!(matches!(err, LoggingError::InvalidLevel(ref l) if l == "chatty"));
    }

    #[test]
    fn test_open_log_file_appends() {
        // Arrange
        let path = std::env::temp_dir().join(format!("hidrelay-{}.log", uuid::Uuid::new_v4()));
        std::fs::write(&path, "first\n").unwrap();

        // Act
        {
            use std::io::Write;
            let mut file = open_log_file(&path).unwrap();
            writeln!(file, "second").unwrap();
        }

        // Assert
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_open_log_file_in_missing_directory_fails() {
        let path = std::env::temp_dir()
            .join(format!("hidrelay-missing-{}", uuid::Uuid::new_v4()))
            .join("relay.log");

        let result = open_log_file(&path);

        assert!(matches!(result, Err(LoggingError::OpenFile { .. })));
    }
}
