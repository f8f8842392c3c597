//! Coverage aggregation across execution contexts.
//!
//! Each execution context of a session (process, thread) writes its own
//! `coverage-<id>.json` fragment into the session's coverage directory. Writers
//! never coordinate; a fragment is written once by one producer and never
//! modified. After the run, the aggregator folds every fragment into one
//! report with per-file set union and writes it as `coverage.json` next to
//! them. Fragments are kept for audit.
//!
//! # Malformed Fragments
//!
//! A fragment that does not parse is handled per [`FragmentPolicy`]:
//! `Abort` fails the merge and writes nothing, `Skip` warns and merges the rest.
//! Either way no other fragment is touched.

use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use dynarun_protocol::{is_fragment_file_name, CoverageReport};

use crate::error::{Result, RunError};
use crate::storage::StorageConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentPolicy {
    #[default]
    Abort,
    Skip,
}

/// What a merge read and wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub report: CoverageReport,
    pub report_path: PathBuf,
    pub fragments_merged: usize,
    pub skipped: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CoverageAggregator {
    policy: FragmentPolicy,
}

impl CoverageAggregator {
    pub fn new(policy: FragmentPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> FragmentPolicy {
        self.policy
    }

    /// Fragment files in `dir`, sorted by name. The merged report is excluded.
    pub fn fragment_paths(dir: &Path) -> Result<Vec<PathBuf>> {
        let entries =
            fs::read_dir(dir).map_err(|e| RunError::io("Failed to list coverage directory", e))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RunError::io("Failed to list coverage directory", e))?;
            let path = entry.path();
            let is_fragment = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(is_fragment_file_name)
                .unwrap_or(false);
            if is_fragment && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Folds every fragment in `dir` into one report without writing anything.
    pub fn merge(&self, dir: &Path) -> Result<CoverageReport> {
        self.collect(dir).map(|(report, _, _)| report)
    }

    /// Merges `dir` and writes the result to `dir/coverage.json`.
    pub fn merge_into_report(&self, dir: &Path) -> Result<MergeSummary> {
        let (report, fragments_merged, skipped) = self.collect(dir)?;
        let report_path = StorageConfig::merged_report(dir);
        write_report(&report_path, &report)?;

        tracing::info!(
            path = %report_path.display(),
            fragments = fragments_merged,
            skipped = skipped.len(),
            files = report.file_count(),
            "Merged coverage report written"
        );

        Ok(MergeSummary {
            report,
            report_path,
            fragments_merged,
            skipped,
        })
    }

    fn collect(&self, dir: &Path) -> Result<(CoverageReport, usize, Vec<PathBuf>)> {
        let mut merged = CoverageReport::new();
        let mut count = 0;
        let mut skipped = Vec::new();

        for path in Self::fragment_paths(dir)? {
            match read_fragment(&path) {
                Ok(fragment) => {
                    tracing::debug!(
                        path = %path.display(),
                        files = fragment.file_count(),
                        "Merging coverage fragment"
                    );
                    merged.merge(fragment);
                    count += 1;
                }
                Err(err @ RunError::MalformedFragment { .. })
                    if self.policy == FragmentPolicy::Skip =>
                {
                    tracing::warn!(error = %err, "Skipping malformed coverage fragment");
                    skipped.push(path);
                }
                Err(err) => return Err(err),
            }
        }

        Ok((merged, count, skipped))
    }
}

fn read_fragment(path: &Path) -> Result<CoverageReport> {
    let content = fs::read(path).map_err(|e| RunError::io("Failed to read coverage fragment", e))?;
    CoverageReport::from_json_bytes(&content).map_err(|e| RunError::MalformedFragment {
        path: path.to_path_buf(),
        details: e.to_string(),
    })
}

/// Writes via temp file + rename so readers never see a partial report.
fn write_report(path: &Path, report: &CoverageReport) -> Result<()> {
    let content = report.to_json().map_err(|e| RunError::Json {
        context: "Failed to serialize merged coverage".to_string(),
        source: e,
    })?;

    let parent = path.parent().ok_or_else(|| {
        RunError::io(
            "Merged report path has no parent",
            std::io::Error::from(std::io::ErrorKind::InvalidInput),
        )
    })?;
    let mut temp_file = NamedTempFile::new_in(parent)
        .map_err(|e| RunError::io("Failed to create temp report file", e))?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| RunError::io("Failed to write temp report file", e))?;
    temp_file
        .flush()
        .map_err(|e| RunError::io("Failed to flush temp report file", e))?;
    temp_file
        .persist(path)
        .map_err(|e| RunError::io("Failed to write merged report", e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynarun_protocol::{fragment_file_name, CoveredItem, MERGED_REPORT_NAME};

    fn write_fragment(dir: &Path, context: &str, json: &str) -> PathBuf {
        let path = dir.join(fragment_file_name(context));
        std::fs::write(&path, json).expect("write fragment");
        path
    }

    fn report(json: &str) -> CoverageReport {
        CoverageReport::from_json(json).expect("valid report")
    }

    #[test]
    fn two_fragments_merge_into_union() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        write_fragment(temp_dir.path(), "p1", r#"{"a.py": [1, 2]}"#);
        write_fragment(temp_dir.path(), "p2", r#"{"a.py": [2, 3]}"#);

        let summary = CoverageAggregator::default()
            .merge_into_report(temp_dir.path())
            .expect("merge");

        assert_eq!(summary.report, report(r#"{"a.py": [1, 2, 3]}"#));
        assert_eq!(summary.fragments_merged, 2);
        assert_eq!(summary.report_path, temp_dir.path().join(MERGED_REPORT_NAME));

        let written = std::fs::read_to_string(&summary.report_path).unwrap();
        assert_eq!(report(&written), summary.report);
    }

    #[test]
    fn merged_report_and_foreign_files_are_not_inputs() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        write_fragment(temp_dir.path(), "p1", r#"{"a.py": [1]}"#);
        std::fs::write(temp_dir.path().join(MERGED_REPORT_NAME), r#"{"old.py": [99]}"#).unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "not coverage").unwrap();
        std::fs::create_dir(temp_dir.path().join("coverage-dir.json")).unwrap();

        let merged = CoverageAggregator::default()
            .merge(temp_dir.path())
            .expect("merge");
        assert_eq!(merged, report(r#"{"a.py": [1]}"#));
    }

    #[test]
    fn remerging_is_stable_and_keeps_fragments() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let f1 = write_fragment(temp_dir.path(), "p1", r#"{"a.py": [1], "b.py": ["x"]}"#);
        let f2 = write_fragment(temp_dir.path(), "p2", r#"{"b.py": ["y"]}"#);

        let aggregator = CoverageAggregator::default();
        let first = aggregator.merge_into_report(temp_dir.path()).unwrap();
        let second = aggregator.merge_into_report(temp_dir.path()).unwrap();

        assert_eq!(first.report, second.report);
        assert!(f1.exists() && f2.exists());
        assert!(second
            .report
            .covered("b.py")
            .unwrap()
            .contains(&CoveredItem::from("y")));
    }

    #[test]
    fn duplicate_fragment_content_does_not_double_count() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        write_fragment(temp_dir.path(), "p1", r#"{"a.py": [1, 2]}"#);
        write_fragment(temp_dir.path(), "p2", r#"{"a.py": [1, 2]}"#);

        let merged = CoverageAggregator::default().merge(temp_dir.path()).unwrap();
        assert_eq!(merged.item_count(), 2);
    }

    #[test]
    fn malformed_fragment_aborts_by_default() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        write_fragment(temp_dir.path(), "p1", r#"{"a.py": [1]}"#);
        let bad = write_fragment(temp_dir.path(), "p2", "{truncated");

        let err = CoverageAggregator::default()
            .merge_into_report(temp_dir.path())
            .unwrap_err();

        match err {
            RunError::MalformedFragment { path, .. } => assert_eq!(path, bad),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!temp_dir.path().join(MERGED_REPORT_NAME).exists());
    }

    #[test]
    fn malformed_fragment_is_skipped_under_skip_policy() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        write_fragment(temp_dir.path(), "p1", r#"{"a.py": [1]}"#);
        let bad = write_fragment(temp_dir.path(), "p2", r#"["not", "a", "mapping"]"#);
        write_fragment(temp_dir.path(), "p3", r#"{"a.py": [4]}"#);

        let summary = CoverageAggregator::new(FragmentPolicy::Skip)
            .merge_into_report(temp_dir.path())
            .expect("merge");

        assert_eq!(summary.report, report(r#"{"a.py": [1, 4]}"#));
        assert_eq!(summary.fragments_merged, 2);
        assert_eq!(summary.skipped, vec![bad.clone()]);
        assert_eq!(std::fs::read_to_string(bad).unwrap(), r#"["not", "a", "mapping"]"#);
    }

    #[test]
    fn non_utf8_fragment_is_malformed_not_io() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        write_fragment(temp_dir.path(), "a", r#"{"a.py": [1]}"#);
        let bad = temp_dir.path().join(fragment_file_name("b"));
        std::fs::write(&bad, [0xff, 0xfe, 0x7b]).expect("write fragment");

        let summary = CoverageAggregator::new(FragmentPolicy::Skip)
            .merge_into_report(temp_dir.path())
            .expect("merge");
        assert_eq!(summary.report, report(r#"{"a.py": [1]}"#));
        assert_eq!(summary.skipped, vec![bad.clone()]);

        let err = CoverageAggregator::default()
            .merge(temp_dir.path())
            .unwrap_err();
        match err {
            RunError::MalformedFragment { path, .. } => assert_eq!(path, bad),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_directory_writes_empty_report() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let summary = CoverageAggregator::default()
            .merge_into_report(temp_dir.path())
            .expect("merge");
        assert!(summary.report.is_empty());
        assert_eq!(
            std::fs::read_to_string(summary.report_path).unwrap(),
            "{}"
        );
    }

    #[test]
    fn missing_directory_is_io_error() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let err = CoverageAggregator::default()
            .merge(&temp_dir.path().join("absent"))
            .unwrap_err();
        assert!(matches!(err, RunError::Io { .. }));
    }
}
