//! Analysis plugin interface and the per-session analysis registry.
//! Register orchestrator-side analyses in a [`AnalysisCatalog`] so sessions can find them.

mod catalog;
pub mod registry_file;

pub use catalog::{AnalysisCatalog, AnalysisFactory, InstrumentedAnalysis};

/// Lifecycle hooks for an analysis selected for a session.
///
/// Both hooks default to no-ops; an analysis overrides only the ones it cares
/// about. Hooks run on the orchestrator side, in registry order:
/// - `begin_execution` once before the target program starts
/// - `end_execution` once after it finishes, whether or not it succeeded
pub trait Analysis: Send {
    /// Identifier as written to the analysis registry (e.g., "BranchCoverage")
    fn id(&self) -> &str;

    fn begin_execution(&self) {}

    fn end_execution(&self) {}
}
