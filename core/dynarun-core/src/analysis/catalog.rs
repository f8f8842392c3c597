//! Maps analysis identifiers to orchestrator-side implementations.

use std::collections::HashMap;
use std::sync::Arc;

use super::Analysis;

/// Builds a fresh analysis instance. Each registry entry gets its own instance,
/// so a duplicated identifier fires its hooks once per occurrence.
pub type AnalysisFactory = Arc<dyn Fn() -> Box<dyn Analysis> + Send + Sync>;

/// An analysis that lives entirely inside the instrumented runtime.
///
/// The orchestrator still lists it in the registry and exports it to the
/// target, but has no hooks of its own to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentedAnalysis {
    id: String,
}

impl InstrumentedAnalysis {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl Analysis for InstrumentedAnalysis {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Default)]
pub struct AnalysisCatalog {
    factories: HashMap<String, AnalysisFactory>,
}

impl AnalysisCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an orchestrator-side analysis. A later registration for the
    /// same identifier replaces the earlier one.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Analysis> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Instantiates one analysis per identifier, preserving order and duplicates.
    pub fn instantiate(&self, ids: &[String]) -> Vec<Box<dyn Analysis>> {
        ids.iter()
            .map(|id| match self.factories.get(id) {
                Some(factory) => factory(),
                None => {
                    tracing::debug!(analysis = %id, "No orchestrator hooks registered; instrumented only");
                    Box::new(InstrumentedAnalysis::new(id.clone())) as Box<dyn Analysis>
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for AnalysisCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.factories.keys().collect();
        ids.sort();
        f.debug_struct("AnalysisCatalog")
            .field("registered", &ids)
            .finish()
    }
}
