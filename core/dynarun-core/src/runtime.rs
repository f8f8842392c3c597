//! Runtime state channel between the orchestrator and the target program.
//!
//! Instrumented code needs to know which analyses are active and where coverage
//! goes, but it cannot take parameters from the orchestrator. `RuntimeState`
//! is the single owned record of that configuration: the orchestrator resets
//! and fills it per session, the executor exports it into the target process
//! environment, and the lifecycle hooks run through it.
//!
//! ```text
//! reset → set_coverage → set_analyses → begin_execution → (target runs) → end_execution
//! ```

use std::path::{Path, PathBuf};

use dynarun_protocol::env;

use crate::analysis::{Analysis, AnalysisCatalog};

#[derive(Default)]
pub struct RuntimeState {
    session_id: Option<String>,
    analysis_ids: Vec<String>,
    analyses: Vec<Box<dyn Analysis>>,
    analyses_file: Option<PathBuf>,
    coverage_dir: Option<PathBuf>,
    begun: bool,
    ended: bool,
}

impl RuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything from a previous session and binds the new session id.
    pub fn reset(&mut self, session_id: &str) {
        *self = Self {
            session_id: Some(session_id.to_string()),
            ..Self::default()
        };
    }

    /// `None` disables coverage and clears any earlier directory.
    pub fn set_coverage(&mut self, coverage_dir: Option<PathBuf>) {
        self.coverage_dir = coverage_dir;
    }

    /// Registers the session's analyses in hook order.
    pub fn set_analyses(
        &mut self,
        ids: &[String],
        analyses_file: &Path,
        catalog: &AnalysisCatalog,
    ) {
        self.analysis_ids = ids.to_vec();
        self.analyses = catalog.instantiate(ids);
        self.analyses_file = Some(analyses_file.to_path_buf());
    }

    /// Runs every analysis's begin hook in registry order.
    pub fn begin_execution(&mut self) {
        for analysis in &self.analyses {
            tracing::debug!(analysis = %analysis.id(), "begin_execution");
            analysis.begin_execution();
        }
        self.begun = true;
    }

    /// Runs every analysis's end hook in registry order. Only the first call
    /// per session has any effect.
    pub fn end_execution(&mut self) {
        if self.ended {
            return;
        }
        for analysis in &self.analyses {
            tracing::debug!(analysis = %analysis.id(), "end_execution");
            analysis.end_execution();
        }
        self.ended = true;
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn analysis_ids(&self) -> &[String] {
        &self.analysis_ids
    }

    pub fn coverage_dir(&self) -> Option<&Path> {
        self.coverage_dir.as_deref()
    }

    pub fn coverage_enabled(&self) -> bool {
        self.coverage_dir.is_some()
    }

    pub fn has_begun(&self) -> bool {
        self.begun
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// Environment the target process reads its session configuration from.
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut vars = Vec::with_capacity(5);
        if let Some(session_id) = &self.session_id {
            vars.push((env::SESSION_ID.to_string(), session_id.clone()));
        }
        vars.push((env::ANALYSES.to_string(), self.analysis_ids.join("\n")));
        if let Some(file) = &self.analyses_file {
            vars.push((env::ANALYSES_FILE.to_string(), file.display().to_string()));
        }
        match &self.coverage_dir {
            Some(dir) => {
                vars.push((env::COVERAGE.to_string(), "1".to_string()));
                vars.push((env::COVERAGE_DIR.to_string(), dir.display().to_string()));
            }
            None => vars.push((env::COVERAGE.to_string(), "0".to_string())),
        }
        vars
    }
}

impl std::fmt::Debug for RuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeState")
            .field("session_id", &self.session_id)
            .field("analyses", &self.analysis_ids)
            .field("analyses_file", &self.analyses_file)
            .field("coverage_dir", &self.coverage_dir)
            .field("begun", &self.begun)
            .field("ended", &self.ended)
            .finish()
    }
}
