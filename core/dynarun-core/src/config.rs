//! Runner configuration loading.
//!
//! Reads `~/.dynarun/config.json`. A missing file yields defaults; a malformed
//! one is logged and also yields defaults, so a broken config never blocks a run.

use crate::coverage::FragmentPolicy;
use crate::storage::StorageConfig;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides the configured interpreter.
pub const INTERPRETER_ENV: &str = "DYNARUN_PYTHON";

pub const DEFAULT_INTERPRETER: &str = "python3";
pub const DEFAULT_SOURCE_SUFFIX: &str = ".py";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Interpreter used to load and run the target program.
    pub interpreter: String,
    /// Entries ending with this suffix run as scripts; anything else is a module name.
    pub source_suffix: String,
    /// Where analysis registry files go. `None` means the system temp dir.
    pub registry_dir: Option<PathBuf>,
    /// What to do with coverage fragments that fail to parse.
    pub fragment_policy: FragmentPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.to_string(),
            source_suffix: DEFAULT_SOURCE_SUFFIX.to_string(),
            registry_dir: None,
            fragment_policy: FragmentPolicy::default(),
        }
    }
}

impl RunnerConfig {
    /// Loads the user's config and applies environment overrides.
    pub fn load() -> Self {
        let mut config = StorageConfig::config_file()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default();
        if let Ok(interpreter) = std::env::var(INTERPRETER_ENV) {
            if !interpreter.trim().is_empty() {
                config.interpreter = interpreter;
            }
        }
        config
    }

    /// Loads a config file, returning defaults if it is missing or malformed.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to read runner config; using defaults");
                return Self::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "Malformed runner config; using defaults"
                );
                Self::default()
            }
        }
    }

    /// Storage paths implied by this config.
    pub fn storage(&self) -> StorageConfig {
        let storage = StorageConfig::default();
        match &self.registry_dir {
            Some(dir) => storage.with_registry_root(dir.clone()),
            None => storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let config = RunnerConfig::load_from(&temp_dir.path().join("config.json"));
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.interpreter, "python3");
        assert_eq!(config.fragment_policy, FragmentPolicy::Abort);
    }

    #[test]
    fn partial_file_fills_remaining_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"interpreter": "/opt/py/bin/python", "fragment_policy": "skip"}"#,
        )
        .expect("write config");

        let config = RunnerConfig::load_from(&path);
        assert_eq!(config.interpreter, "/opt/py/bin/python");
        assert_eq!(config.fragment_policy, FragmentPolicy::Skip);
        assert_eq!(config.source_suffix, ".py");
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "{not json").expect("write config");
        assert_eq!(RunnerConfig::load_from(&path), RunnerConfig::default());
    }

    #[test]
    fn registry_dir_moves_registry_root() {
        let config = RunnerConfig {
            registry_dir: Some(PathBuf::from("/var/dynarun")),
            ..RunnerConfig::default()
        };
        assert_eq!(config.storage().registry_root(), Path::new("/var/dynarun"));
    }
}
