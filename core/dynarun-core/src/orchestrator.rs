//! Session orchestrator.
//!
//! Turns "run entry E under analyses A, coverage on/off" into one session:
//!
//! ```text
//! resolve entry          fails early with EntryNotFound/InvalidEntry, nothing written
//! new session id         UUID v4
//! reset runtime state    nothing from a previous session survives
//! coverage dir           <root>/dynapyt_coverage-<id>/ (only when enabled)
//! analysis registry      <registry_root>/dynapyt_analyses-<id>.txt
//! begin hooks            registry order
//! execute entry          child interpreter
//! end hooks              always, even if the target failed
//! merge coverage         coverage.json, only when enabled and the target succeeded
//! ```

use fs_err as fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::{registry_file, AnalysisCatalog};
use crate::config::RunnerConfig;
use crate::coverage::{CoverageAggregator, MergeSummary};
use crate::error::{Result, RunError};
use crate::executor::{EntryExecutor, InterpreterLauncher, ProcessEnvironment};
use crate::runtime::RuntimeState;
use crate::storage::StorageConfig;

/// One request to run an entry under a set of analyses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    pub entry: String,
    /// Hook order; duplicates allowed.
    pub analyses: Vec<String>,
    /// Accepted for labelling only.
    pub name: Option<String>,
    pub coverage: bool,
    /// Parent of the session coverage directory. `None` uses the storage default.
    pub coverage_dir: Option<PathBuf>,
}

impl RunRequest {
    pub fn new(entry: impl Into<String>, analyses: Vec<String>) -> Self {
        Self {
            entry: entry.into(),
            analyses,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_coverage(mut self, coverage_dir: Option<PathBuf>) -> Self {
        self.coverage = true;
        self.coverage_dir = coverage_dir;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub session_id: String,
    pub analyses_file: PathBuf,
    pub coverage_dir: Option<PathBuf>,
    pub merge: Option<MergeSummary>,
}

#[derive(Debug)]
pub struct Orchestrator {
    storage: StorageConfig,
    catalog: AnalysisCatalog,
    executor: EntryExecutor,
    aggregator: CoverageAggregator,
    runtime: RuntimeState,
}

impl Orchestrator {
    pub fn new(
        storage: StorageConfig,
        catalog: AnalysisCatalog,
        executor: EntryExecutor,
        aggregator: CoverageAggregator,
    ) -> Self {
        Self {
            storage,
            catalog,
            executor,
            aggregator,
            runtime: RuntimeState::new(),
        }
    }

    /// Orchestrator for the calling process, running targets in the configured interpreter.
    pub fn from_config(config: &RunnerConfig, catalog: AnalysisCatalog) -> Result<Self> {
        let executor = EntryExecutor::new(
            Box::new(InterpreterLauncher::new(config.interpreter.clone())),
            ProcessEnvironment::capture()?,
            config.source_suffix.clone(),
        );
        Ok(Self::new(
            config.storage(),
            catalog,
            executor,
            CoverageAggregator::new(config.fragment_policy),
        ))
    }

    pub fn runtime(&self) -> &RuntimeState {
        &self.runtime
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    /// Runs one session to completion and returns its outcome.
    ///
    /// A failing target is returned as `RunError::TargetFailed` after the end
    /// hooks have run; the registry and coverage directory are left in place.
    pub fn run(&mut self, request: &RunRequest) -> Result<RunOutcome> {
        let entry = self.executor.resolve(&request.entry)?;

        let session_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("session", id = %session_id, name = ?request.name);
        let _guard = span.enter();
        info!(
            entry = %request.entry,
            analyses = ?request.analyses,
            coverage = request.coverage,
            "Session started"
        );

        self.runtime.reset(&session_id);

        let coverage_dir = if request.coverage {
            let dir = self
                .storage
                .coverage_dir(request.coverage_dir.as_deref(), &session_id);
            create_coverage_dir(&dir)?;
            Some(dir)
        } else {
            None
        };
        self.runtime.set_coverage(coverage_dir.clone());

        let analyses_file = self.storage.analyses_file(&session_id);
        registry_file::write(&analyses_file, &request.analyses)?;
        self.runtime
            .set_analyses(&request.analyses, &analyses_file, &self.catalog);

        self.runtime.begin_execution();
        let executed = self.executor.execute(&entry, &self.runtime);
        self.runtime.end_execution();
        if let Err(err) = executed {
            warn!(error = %err, "Session execution failed");
            return Err(err);
        }

        let merge = match &coverage_dir {
            Some(dir) => Some(self.aggregator.merge_into_report(dir)?),
            None => None,
        };

        info!("Session finished");
        Ok(RunOutcome {
            session_id,
            analyses_file,
            coverage_dir,
            merge,
        })
    }
}

fn create_coverage_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| RunError::io("Failed to create coverage directory", e))?;
    tracing::debug!(path = %dir.display(), "Coverage directory ready");
    Ok(())
}

/// Runs `entry` under `analyses` with the user's runner configuration and
/// returns the session id.
pub fn run_analysis(
    entry: &str,
    analyses: &[String],
    name: Option<&str>,
    coverage: bool,
    coverage_dir: Option<&Path>,
) -> Result<String> {
    let mut request = RunRequest::new(entry, analyses.to_vec());
    request.name = name.map(str::to_string);
    if coverage {
        request = request.with_coverage(coverage_dir.map(Path::to_path_buf));
    }

    let mut orchestrator = Orchestrator::from_config(&RunnerConfig::load(), AnalysisCatalog::new())?;
    orchestrator.run(&request).map(|outcome| outcome.session_id)
}
