//! Per-run execution context: the analytic engine handle, the variable
//! resolver, and the registry of configured source connectors. Copy-on-update
//! per spec.md's concurrency model — `with_source` returns a new context
//! sharing the same engine handle and resolver, so folding a step's delta in
//! never mutates state later steps of the same level have already captured.

use std::collections::HashMap;
use std::sync::Arc;

use datafusion::execution::context::SessionContext;
use sqlflow_core::errors::handler::ErrorStrategy;
use sqlflow_core::vars::VariableResolver;

/// A source connector registered by a `source_definition` step, available to
/// any `load` step that names it.
#[derive(Clone)]
pub struct SourceHandle {
    pub name: String,
    pub connector_type: String,
    pub params: HashMap<String, serde_json::Value>,
    pub is_from_profile: bool,
}

#[derive(Clone)]
pub struct ExecutionContext {
    pub engine: Arc<SessionContext>,
    pub resolver: Arc<VariableResolver>,
    pub error_strategy: ErrorStrategy,
    pub sources: Arc<HashMap<String, SourceHandle>>,
}

impl ExecutionContext {
    pub fn new(
        engine: Arc<SessionContext>,
        resolver: Arc<VariableResolver>,
        error_strategy: ErrorStrategy,
    ) -> Self {
        Self {
            engine,
            resolver,
            error_strategy,
            sources: Arc::new(HashMap::new()),
        }
    }

    /// Folds a newly-registered source handle into a fresh context, leaving
    /// `self` (and whoever else is holding it) untouched.
    pub fn with_source(&self, handle: SourceHandle) -> Self {
        let mut sources = (*self.sources).clone();
        sources.insert(handle.name.clone(), handle);
        Self {
            engine: self.engine.clone(),
            resolver: self.resolver.clone(),
            error_strategy: self.error_strategy,
            sources: Arc::new(sources),
        }
    }

    pub fn source(&self, name: &str) -> Option<&SourceHandle> {
        self.sources.get(name)
    }
}
