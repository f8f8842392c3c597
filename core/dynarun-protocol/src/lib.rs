//! On-disk session contracts for dynarun.
//!
//! This crate is shared by the orchestrator and by anything that writes into a
//! session from inside an instrumented runtime, so both sides agree on file
//! names, environment variables, and the coverage schema. The orchestrator is
//! the only writer of the analysis registry and the merged report; fragment
//! files are written by the instrumented runtime, one per execution context.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// File Naming
// ═══════════════════════════════════════════════════════════════════════════════

/// Prefix of a session's coverage directory: `dynapyt_coverage-<session>`.
pub const COVERAGE_DIR_PREFIX: &str = "dynapyt_coverage-";
/// Prefix of a session's analysis registry file: `dynapyt_analyses-<session>.txt`.
pub const ANALYSES_FILE_PREFIX: &str = "dynapyt_analyses-";
pub const ANALYSES_FILE_SUFFIX: &str = ".txt";

pub const FRAGMENT_PREFIX: &str = "coverage-";
pub const FRAGMENT_SUFFIX: &str = ".json";
/// Name of the merged report inside a coverage directory. Never matches the
/// fragment pattern, so a re-merge cannot read its own output.
pub const MERGED_REPORT_NAME: &str = "coverage.json";

pub fn coverage_dir_name(session_id: &str) -> String {
    format!("{}{}", COVERAGE_DIR_PREFIX, session_id)
}

pub fn analyses_file_name(session_id: &str) -> String {
    format!("{}{}{}", ANALYSES_FILE_PREFIX, session_id, ANALYSES_FILE_SUFFIX)
}

/// File name for a fragment produced by one execution context.
pub fn fragment_file_name(context_id: &str) -> String {
    format!("{}{}{}", FRAGMENT_PREFIX, context_id, FRAGMENT_SUFFIX)
}

/// Returns true if `name` matches `coverage-*.json`.
pub fn is_fragment_file_name(name: &str) -> bool {
    name.len() >= FRAGMENT_PREFIX.len() + FRAGMENT_SUFFIX.len()
        && name.starts_with(FRAGMENT_PREFIX)
        && name.ends_with(FRAGMENT_SUFFIX)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Runtime Environment
// ═══════════════════════════════════════════════════════════════════════════════

/// Environment variables through which the target process learns about its session.
pub mod env {
    pub const SESSION_ID: &str = "DYNARUN_SESSION_ID";
    /// Newline-joined analysis identifiers, in hook order.
    pub const ANALYSES: &str = "DYNARUN_ANALYSES";
    pub const ANALYSES_FILE: &str = "DYNARUN_ANALYSES_FILE";
    /// `1` when coverage is collected, `0` otherwise.
    pub const COVERAGE: &str = "DYNARUN_COVERAGE";
    /// Only set when coverage is enabled.
    pub const COVERAGE_DIR: &str = "DYNARUN_COVERAGE_DIR";
}

// ═══════════════════════════════════════════════════════════════════════════════
// Coverage Schema
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifier of one covered item (statement, branch, ...).
///
/// Instrumented runtimes mostly emit integer ids; string ids are accepted so
/// that richer identifiers survive a merge untouched. Integers sort first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoveredItem {
    Index(i64),
    Label(String),
}

impl fmt::Display for CoveredItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoveredItem::Index(i) => write!(f, "{}", i),
            CoveredItem::Label(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for CoveredItem {
    fn from(value: i64) -> Self {
        CoveredItem::Index(value)
    }
}

impl From<&str> for CoveredItem {
    fn from(value: &str) -> Self {
        CoveredItem::Label(value.to_string())
    }
}

/// File identity → covered items.
///
/// Used both for a single fragment and for the merged report; they share a schema.
/// Serializes as a JSON object of sorted arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageReport {
    files: BTreeMap<String, BTreeSet<CoveredItem>>,
}

impl CoverageReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a fragment or merged report.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Parses raw fragment bytes. Invalid UTF-8 is a parse error, not an I/O one.
    pub fn from_json_bytes(content: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(content)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn record(&mut self, file: impl Into<String>, item: impl Into<CoveredItem>) {
        self.files.entry(file.into()).or_default().insert(item.into());
    }

    /// Folds `other` into `self` with per-file set union.
    ///
    /// Union is commutative, associative and idempotent, so the result does not
    /// depend on the order fragments arrive in or on how often one is seen.
    pub fn merge(&mut self, other: CoverageReport) {
        for (file, items) in other.files {
            match self.files.get_mut(&file) {
                Some(existing) => existing.extend(items),
                None => {
                    self.files.insert(file, items);
                }
            }
        }
    }

    pub fn covered(&self, file: &str) -> Option<&BTreeSet<CoveredItem>> {
        self.files.get(file)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &BTreeSet<CoveredItem>)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn item_count(&self) -> usize {
        self.files.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl<F, I> FromIterator<(F, I)> for CoverageReport
where
    F: Into<String>,
    I: Into<CoveredItem>,
{
    fn from_iter<T: IntoIterator<Item = (F, I)>>(iter: T) -> Self {
        let mut report = CoverageReport::new();
        for (file, item) in iter {
            report.record(file, item);
        }
        report
    }
}
