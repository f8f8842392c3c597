//! Storage configuration and path management for dynarun sessions.
//!
//! Every path a session reads or writes is derived here, so tests can inject
//! temp directories and the instrumented runtime can derive the same names
//! from the session id alone.
//!
//! ## Layout
//!
//! ```text
//! <registry_root>/dynapyt_analyses-<session>.txt      analysis registry
//! <coverage_root>/dynapyt_coverage-<session>/          fragment directory
//!     coverage-<context>.json                          one per execution context
//!     coverage.json                                    merged report
//! ~/.dynarun/config.json                               runner configuration
//! ```

use dynarun_protocol::{analyses_file_name, coverage_dir_name, MERGED_REPORT_NAME};
use std::path::{Path, PathBuf};

/// Central configuration for session artifact paths.
///
/// Production code uses `StorageConfig::default()`, which writes session
/// artifacts to the system temp directory. Tests use `StorageConfig::with_root`.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Where analysis registry files live (default: system temp dir).
    registry_root: PathBuf,
    /// Where coverage directories go when the caller names none (default: system temp dir).
    default_coverage_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let temp = std::env::temp_dir();
        Self {
            registry_root: temp.clone(),
            default_coverage_root: temp,
        }
    }
}

impl StorageConfig {
    /// Creates a StorageConfig rooted at a single directory.
    /// Used for testing with temp directories.
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            registry_root: root.clone(),
            default_coverage_root: root,
        }
    }

    /// Overrides the registry root, keeping the coverage default.
    pub fn with_registry_root(mut self, registry_root: PathBuf) -> Self {
        self.registry_root = registry_root;
        self
    }

    pub fn registry_root(&self) -> &Path {
        &self.registry_root
    }

    pub fn default_coverage_root(&self) -> &Path {
        &self.default_coverage_root
    }

    /// Path to a session's analysis registry file.
    pub fn analyses_file(&self, session_id: &str) -> PathBuf {
        self.registry_root.join(analyses_file_name(session_id))
    }

    /// Path to a session's coverage fragment directory.
    ///
    /// `coverage_root` is the caller-provided parent; `None` falls back to the
    /// default coverage root.
    pub fn coverage_dir(&self, coverage_root: Option<&Path>, session_id: &str) -> PathBuf {
        coverage_root
            .unwrap_or(&self.default_coverage_root)
            .join(coverage_dir_name(session_id))
    }

    /// Path to the merged report inside a coverage directory.
    pub fn merged_report(coverage_dir: &Path) -> PathBuf {
        coverage_dir.join(MERGED_REPORT_NAME)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // User Paths
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to the dynarun home directory (~/.dynarun).
    pub fn home_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".dynarun"))
    }

    /// Path to the runner configuration file (~/.dynarun/config.json).
    pub fn config_file() -> Option<PathBuf> {
        Self::home_dir().map(|d| d.join("config.json"))
    }
}
