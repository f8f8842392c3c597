//! Session analysis registry file.
//!
//! Instrumented code in the target process cannot receive arguments from the
//! orchestrator directly, so the selected analyses are persisted to a path
//! derived from the session id (see [`StorageConfig::analyses_file`]).
//!
//! # File Format
//!
//! Plain text, one identifier per line, no trailing newline. Order is hook
//! order and duplicates are kept.
//!
//! [`StorageConfig::analyses_file`]: crate::storage::StorageConfig::analyses_file

use fs_err as fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Result, RunError};

/// Writes the registry, replacing any file already at `path`.
///
/// One orchestrator owns a session id, so no cross-process locking is done.
pub fn write(path: &Path, analyses: &[String]) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).map_err(|e| RunError::io("Failed to remove stale registry", e))?;
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| RunError::io("Failed to create registry directory", e))?;
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| RunError::io("Failed to create registry", e))?;
    file.write_all(analyses.join("\n").as_bytes())
        .map_err(|e| RunError::io("Failed to write registry", e))?;

    tracing::debug!(
        path = %path.display(),
        count = analyses.len(),
        "Analysis registry written"
    );
    Ok(())
}

/// Reads a registry back. An empty file is an empty list.
pub fn read(path: &Path) -> Result<Vec<String>> {
    let content =
        fs::read_to_string(path).map_err(|e| RunError::io("Failed to read registry", e))?;
    if content.is_empty() {
        return Ok(Vec::new());
    }
    Ok(content.split('\n').map(str::to_string).collect())
}
