//! # dynarun-core
//!
//! Orchestrates one dynamic-analysis session: runs a target program under a
//! set of analyses, optionally collects coverage, and merges the coverage
//! fragments the (possibly multi-process) run produced into one report.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. One session runs start to finish on the calling thread.
//! - **Explicit state**: The runtime state channel is an owned value, reset per session.
//! - **Out-of-process targets**: The target runs in its own interpreter; the
//!   orchestrator's process is never mutated.
//! - **Artifacts outlive the run**: Registry files, fragments and merged reports
//!   stay on disk for inspection.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dynarun_core::{AnalysisCatalog, Orchestrator, RunRequest, RunnerConfig};
//!
//! let mut orchestrator = Orchestrator::from_config(&RunnerConfig::load(), AnalysisCatalog::new())?;
//! let outcome = orchestrator.run(&RunRequest::new("script.py", vec!["TraceAll".into()]))?;
//! println!("{}", outcome.session_id);
//! ```

pub mod analysis;
pub mod config;
pub mod coverage;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod runtime;
pub mod storage;

pub use analysis::{Analysis, AnalysisCatalog, InstrumentedAnalysis};
pub use config::RunnerConfig;
pub use coverage::{CoverageAggregator, FragmentPolicy, MergeSummary};
pub use error::{Result, RunError};
pub use executor::{Entry, EntryExecutor, ExecutionPlan, InterpreterLauncher, Launcher, ProcessEnvironment};
pub use orchestrator::{run_analysis, Orchestrator, RunOutcome, RunRequest};
pub use runtime::RuntimeState;
pub use storage::StorageConfig;
