//! src/error.rs
//! ============================================================================
//! # `Error`: Unified Error Type for the Report Writer
//!
//! Every fallible operation in the crate returns [`Result<T>`]. Variants carry
//! the path they failed on so shutdown logs point at the offending file.

use std::{io, path::PathBuf};
use thiserror::Error;

/// Unified error type for all reporting operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Opening, creating or flushing a result file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing a CSV record failed.
    #[error("CSV write error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A row was written while no result target was open.
    #[error("No result target is open")]
    NoTarget,

    /// The monitoring resource refused to close.
    #[error("Failed to release monitoring resource: {0}")]
    ResourceRelease(String),

    /// Config file I/O error with path.
    #[error("Failed to read config file {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// TOML config parsing error.
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// Snapshot (de)serialization error.
    #[error("Snapshot serialization error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Logging subsystem could not be installed.
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl Error {
    /// Wrap an `io::Error` with the path it occurred on.
    pub fn io<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a `csv::Error` with the path it occurred on.
    pub fn csv<P: Into<PathBuf>>(path: P, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_names_path() {
        let err = Error::io(
            "/tmp/out/joularJX-1-all-methods-energy.csv",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("joularJX-1-all-methods-energy.csv"), "{msg}");
        assert!(msg.contains("denied"), "{msg}");
    }

    #[test]
    fn test_resource_release_message() {
        let err = Error::ResourceRelease("sensor busy".into());
        assert_eq!(
            err.to_string(),
            "Failed to release monitoring resource: sensor busy"
        );
    }
}
