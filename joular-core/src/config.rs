//! src/config.rs
//! ============================================================================
//! # AgentProperties: Agent Configuration Loader
//!
//! Read-only settings consumed by the shutdown stage. Loaded from TOML; every
//! key is optional and falls back to the agent defaults.
//!
//! ## Lookup order for [`AgentProperties::discover`]
//! - `./config.toml` in the working directory
//! - the platform config dir (via [`directories`](https://docs.rs/directories))
//! - built-in defaults
//!
//! ## Example
//! ```rust,ignore
//! let props = AgentProperties::load("config.toml")?;
//! if props.track_consumption_evolution { /* ... */ }
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::error::{Error, Result};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Settings of the monitoring agent relevant to result reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentProperties {
    /// Write one time-series file per method at shutdown
    pub track_consumption_evolution: bool,

    /// Write call-tree energy datasets at shutdown
    pub call_trees_consumption: bool,

    /// Root of the `all/` and `filtered/` evolution folders, relative to `output_dir`
    pub evolution_data_path: PathBuf,

    /// Directory receiving every result file
    pub output_dir: PathBuf,

    /// Default `EnvFilter` directive (`RUST_LOG` wins when set)
    pub logger_level: String,

    /// Optional log file, in addition to stderr
    pub log_file: Option<PathBuf>,
}

impl Default for AgentProperties {
    fn default() -> Self {
        Self {
            track_consumption_evolution: false,
            call_trees_consumption: false,
            evolution_data_path: PathBuf::from("evolution"),
            output_dir: PathBuf::from("."),
            logger_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl AgentProperties {
    /// Loads properties from a TOML file, or returns defaults if it does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => {
                info!("Loading config from {}", path.display());
                Self::from_toml_str(&text)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "No config file found at {}, using default configuration",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(source) => Err(Error::ConfigIo {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parses properties from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Finds the first config file in the lookup order and loads it.
    pub fn discover() -> Result<Self> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Self::load(local);
        }

        match Self::config_path() {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Platform config file path, when a home directory can be resolved.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "noureddine", "joularjx")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Root of the evolution folders, resolved against `output_dir`.
    ///
    /// An absolute `evolution_data_path` is returned unchanged.
    pub fn evolution_root(&self) -> PathBuf {
        self.output_dir.join(&self.evolution_data_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_empty() {
        let props = AgentProperties::from_toml_str("").unwrap();
        assert_eq!(props, AgentProperties::default());
        assert!(!props.track_consumption_evolution);
        assert!(!props.call_trees_consumption);
        assert_eq!(props.evolution_root(), PathBuf::from("./evolution"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let props = AgentProperties::from_toml_str(
            r#"
            track_consumption_evolution = true
            evolution_data_path = "/var/lib/joularjx/evolution"
            "#,
        )
        .unwrap();

        assert!(props.track_consumption_evolution);
        assert!(!props.call_trees_consumption);
        assert_eq!(props.logger_level, "info");
        assert_eq!(
            props.evolution_root(),
            PathBuf::from("/var/lib/joularjx/evolution")
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = AgentProperties::from_toml_str("track_everything = true");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let props = AgentProperties::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(props, AgentProperties::default());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "call_trees_consumption = true\noutput_dir = \"results\"\nlogger_level = \"debug\"\n",
        )
        .unwrap();

        let props = AgentProperties::load(&path).unwrap();
        assert!(props.call_trees_consumption);
        assert_eq!(props.output_dir, PathBuf::from("results"));
        assert_eq!(props.logger_level, "debug");
    }

    #[test]
    fn test_load_directory_is_config_io_error() {
        let dir = TempDir::new().unwrap();
        let result = AgentProperties::load(dir.path());
        assert!(matches!(result, Err(Error::ConfigIo { .. })));
    }
}
