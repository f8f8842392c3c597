//! Entry executor: runs the target program in the interpreter.
//!
//! ## Entry Modes
//!
//! - **Script** (`path/to/prog.py`): argv becomes `[path]`, the script's parent
//!   directory goes to the front of the module search path, and the file runs
//!   through the runtime's own program loader with `__file__` set to its
//!   absolute path.
//! - **Module** (`pkg.sub.mod`): located on the search path without importing
//!   anything, then imported once through the normal import machinery. argv
//!   and search path are untouched.
//!
//! The orchestrator never mutates its own process. Every change above is
//! applied to a child interpreter, configured from an [`ExecutionPlan`] and the
//! session's [`RuntimeState`] environment.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{Result, RunError};
use crate::runtime::RuntimeState;

/// Search path variable read by the interpreter.
pub const SEARCH_PATH_ENV: &str = "PYTHONPATH";

/// Exit code the probe uses for "module not found".
const PROBE_NOT_FOUND: i32 = 3;

/// Runs the target inside the child interpreter.
/// argv: [-c, BOOTSTRAP, kind, target, *target_argv]
const BOOTSTRAP: &str = r#"import importlib, runpy, sys
kind, target = sys.argv[1], sys.argv[2]
sys.argv = sys.argv[3:]
if kind == "script":
    if sys.path and sys.path[0] == "":
        del sys.path[0]
    runpy.run_path(target, run_name="__main__")
else:
    importlib.import_module(target)
"#;

/// Exits 0 if the module named by argv[1] is importable, 3 if not.
///
/// Only the top-level name goes through `find_spec`; deeper components are
/// located on their parent's search locations. No package `__init__` runs, so
/// the launch that follows is the only import of the target.
const PROBE: &str = r#"import importlib.util, pkgutil, sys

def locate(name, locations):
    portions = []
    for location in locations:
        finder = pkgutil.get_importer(location)
        find = getattr(finder, "find_spec", None)
        spec = find(name) if find is not None else None
        if spec is None:
            continue
        if spec.loader is not None:
            return True, spec.submodule_search_locations
        portions.extend(spec.submodule_search_locations or [])
    return bool(portions), portions

parts = sys.argv[1].split(".")
try:
    spec = importlib.util.find_spec(parts[0])
    found = spec is not None
    locations = spec.submodule_search_locations if found else None
    for depth in range(2, len(parts) + 1):
        name = ".".join(parts[:depth])
        if name in sys.modules:
            found, locations = True, getattr(sys.modules[name], "__path__", None)
            continue
        if not found or locations is None:
            found = False
            break
        found, locations = locate(name, list(locations))
except (ImportError, ValueError):
    found = False
sys.exit(0 if found else 3)
"#;

static MODULE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\W\d]\w*(\.[^\W\d]\w*)*$").expect("valid module name regex"));

// ═══════════════════════════════════════════════════════════════════════════════
// Entry
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// Path exactly as given by the caller.
    Script(PathBuf),
    /// Dotted module name.
    Module(String),
}

impl Entry {
    /// Classifies a raw entry string. Paths ending in `source_suffix` are scripts;
    /// anything else must be a dotted module name.
    pub fn parse(raw: &str, source_suffix: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RunError::InvalidEntry {
                entry: raw.to_string(),
                reason: "entry is empty".to_string(),
            });
        }
        if trimmed.ends_with(source_suffix) {
            return Ok(Entry::Script(PathBuf::from(trimmed)));
        }
        if MODULE_NAME.is_match(trimmed) {
            return Ok(Entry::Module(trimmed.to_string()));
        }
        Err(RunError::InvalidEntry {
            entry: raw.to_string(),
            reason: format!(
                "expected a path ending in {} or a dotted module name",
                source_suffix
            ),
        })
    }

    pub fn display(&self) -> String {
        match self {
            Entry::Script(path) => path.display().to_string(),
            Entry::Module(name) => name.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Execution Plan
// ═══════════════════════════════════════════════════════════════════════════════

/// The process environment the target inherits unless its mode changes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEnvironment {
    pub argv: Vec<String>,
    pub search_path: Vec<PathBuf>,
    pub working_dir: PathBuf,
}

impl ProcessEnvironment {
    /// Snapshot of the calling process.
    pub fn capture() -> Result<Self> {
        let working_dir = std::env::current_dir()
            .map_err(|e| RunError::io("Failed to read working directory", e))?;
        let search_path = std::env::var_os(SEARCH_PATH_ENV)
            .map(|value| std::env::split_paths(&value).collect())
            .unwrap_or_default();
        Ok(Self {
            argv: std::env::args().collect(),
            search_path,
            working_dir,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Absolute path to the script.
    Script(PathBuf),
    Module(String),
}

/// Everything needed to launch one target process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Entry as the caller wrote it, for messages.
    pub entry: String,
    pub target: Target,
    pub argv: Vec<String>,
    pub search_path: Vec<PathBuf>,
    pub working_dir: PathBuf,
}

impl ExecutionPlan {
    pub fn for_entry(entry: &Entry, base: &ProcessEnvironment) -> Self {
        match entry {
            Entry::Script(path) => {
                let absolute = absolutize(path, &base.working_dir);
                let mut search_path = Vec::with_capacity(base.search_path.len() + 1);
                if let Some(parent) = absolute.parent() {
                    search_path.push(parent.to_path_buf());
                }
                search_path.extend(base.search_path.iter().cloned());
                Self {
                    entry: entry.display(),
                    target: Target::Script(absolute),
                    argv: vec![path.display().to_string()],
                    search_path,
                    working_dir: base.working_dir.clone(),
                }
            }
            Entry::Module(name) => Self {
                entry: name.clone(),
                target: Target::Module(name.clone()),
                argv: base.argv.clone(),
                search_path: base.search_path.clone(),
                working_dir: base.working_dir.clone(),
            },
        }
    }
}

fn absolutize(path: &Path, working_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Launcher
// ═══════════════════════════════════════════════════════════════════════════════

/// Starts target processes. The seam exists so sessions can be driven without
/// a real interpreter.
pub trait Launcher {
    /// Whether `name` resolves to an importable module in `env`.
    fn find_module(&self, name: &str, env: &ProcessEnvironment) -> Result<bool>;

    /// Runs the plan to completion. A failing target is `RunError::TargetFailed`.
    fn launch(&self, plan: &ExecutionPlan, vars: &[(String, String)]) -> Result<()>;
}

/// Launches targets in an external interpreter, inheriting stdio.
#[derive(Debug, Clone)]
pub struct InterpreterLauncher {
    interpreter: String,
}

impl InterpreterLauncher {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    fn command(&self, search_path: &[PathBuf], working_dir: &Path) -> Result<Command> {
        let mut command = Command::new(&self.interpreter);
        command.current_dir(working_dir);
        if search_path.is_empty() {
            command.env_remove(SEARCH_PATH_ENV);
        } else {
            let joined: OsString =
                std::env::join_paths(search_path).map_err(|e| RunError::InterpreterFailed {
                    details: format!("search path cannot be exported: {}", e),
                })?;
            command.env(SEARCH_PATH_ENV, joined);
        }
        Ok(command)
    }

    fn unavailable(&self, source: std::io::Error) -> RunError {
        RunError::InterpreterUnavailable {
            interpreter: self.interpreter.clone(),
            source,
        }
    }
}

impl Launcher for InterpreterLauncher {
    fn find_module(&self, name: &str, env: &ProcessEnvironment) -> Result<bool> {
        let output = self
            .command(&env.search_path, &env.working_dir)?
            .arg("-c")
            .arg(PROBE)
            .arg(name)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.unavailable(e))?;

        match output.status.code() {
            Some(0) => Ok(true),
            Some(PROBE_NOT_FOUND) => Ok(false),
            code => Err(RunError::InterpreterFailed {
                details: format!(
                    "module probe for {} exited with {:?}: {}",
                    name,
                    code,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }),
        }
    }

    fn launch(&self, plan: &ExecutionPlan, vars: &[(String, String)]) -> Result<()> {
        let (kind, target) = match &plan.target {
            Target::Script(path) => ("script", path.display().to_string()),
            Target::Module(name) => ("module", name.clone()),
        };

        let status = self
            .command(&plan.search_path, &plan.working_dir)?
            .arg("-c")
            .arg(BOOTSTRAP)
            .arg(kind)
            .arg(&target)
            .args(&plan.argv)
            .envs(vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .status()
            .map_err(|e| self.unavailable(e))?;

        if status.success() {
            Ok(())
        } else {
            Err(RunError::TargetFailed {
                entry: plan.entry.clone(),
                code: status.code(),
            })
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Executor
// ═══════════════════════════════════════════════════════════════════════════════

pub struct EntryExecutor {
    launcher: Box<dyn Launcher>,
    environment: ProcessEnvironment,
    source_suffix: String,
}

impl EntryExecutor {
    pub fn new(
        launcher: Box<dyn Launcher>,
        environment: ProcessEnvironment,
        source_suffix: impl Into<String>,
    ) -> Self {
        Self {
            launcher,
            environment,
            source_suffix: source_suffix.into(),
        }
    }

    pub fn environment(&self) -> &ProcessEnvironment {
        &self.environment
    }

    /// Parses `raw` and checks that the entry exists, without running it.
    pub fn resolve(&self, raw: &str) -> Result<Entry> {
        let entry = Entry::parse(raw, &self.source_suffix)?;
        let found = match &entry {
            Entry::Script(path) => absolutize(path, &self.environment.working_dir).is_file(),
            Entry::Module(name) => self.launcher.find_module(name, &self.environment)?,
        };
        if !found {
            return Err(RunError::EntryNotFound {
                entry: entry.display(),
            });
        }
        Ok(entry)
    }

    /// Runs the entry with the session configuration from `state`.
    pub fn execute(&self, entry: &Entry, state: &RuntimeState) -> Result<()> {
        let plan = ExecutionPlan::for_entry(entry, &self.environment);
        tracing::debug!(
            entry = %plan.entry,
            target = ?plan.target,
            argv = ?plan.argv,
            "Launching target"
        );
        self.launcher.launch(&plan, &state.to_env())
    }
}

impl std::fmt::Debug for EntryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryExecutor")
            .field("environment", &self.environment)
            .field("source_suffix", &self.source_suffix)
            .finish()
    }
}
