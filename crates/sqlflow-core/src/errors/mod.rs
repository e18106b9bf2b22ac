//! The error taxonomy from spec §7, plus the variable-substitution error
//! handler (component C8) in [`handler`].

pub mod handler;

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

fn truncated(items: &[String], max: usize) -> String {
    if items.is_empty() {
        return String::new();
    }
    let shown: Vec<&str> = items.iter().take(max).map(String::as_str).collect();
    let mut s = shown.join(", ");
    if items.len() > max {
        s.push_str(&format!(" (+{} more)", items.len() - max));
    }
    s
}

/// The requested pipeline file could not be found. Carries searched paths
/// and nearby candidates, per spec §7.
#[derive(Debug, Error)]
#[error("pipeline '{name}' not found")]
pub struct PipelineNotFound {
    pub name: String,
    pub searched_paths: Vec<String>,
    pub candidates: Vec<String>,
}

impl PipelineNotFound {
    /// Rich, CLI-facing message: failing entity, search context, and the
    /// first five candidates with an elided count for the rest.
    pub fn detailed_message(&self) -> String {
        format!(
            "pipeline '{}' not found\n  searched: {}\n  did you mean: {}",
            self.name,
            self.searched_paths.join(", "),
            truncated(&self.candidates, 5)
        )
    }
}

/// The requested profile name is not available.
#[derive(Debug, Error)]
#[error("profile '{name}' not found")]
pub struct ProfileNotFound {
    pub name: String,
    pub available: Vec<String>,
}

impl ProfileNotFound {
    pub fn detailed_message(&self) -> String {
        format!(
            "profile '{}' not found\n  available profiles: {}",
            self.name,
            truncated(&self.available, 5)
        )
    }
}

/// Aggregate validation failure raised by the planner's validation pass.
/// Carries `missing_variables`, `missing_tables`, `invalid_references`, and
/// `context_locations` so the CLI can format a complete diagnostic.
#[derive(Debug, Error, Default)]
#[error("pipeline validation failed")]
pub struct ValidationError {
    pub missing_variables: Vec<String>,
    pub missing_tables: Vec<String>,
    pub invalid_references: Vec<String>,
    pub context_locations: HashMap<String, Vec<String>>,
}

impl ValidationError {
    pub fn is_empty(&self) -> bool {
        self.missing_variables.is_empty()
            && self.missing_tables.is_empty()
            && self.invalid_references.is_empty()
    }

    pub fn detailed_message(&self) -> String {
        let mut lines = vec!["pipeline validation failed".to_string()];
        if !self.missing_variables.is_empty() {
            lines.push(format!(
                "  missing variables: {}",
                truncated(&self.missing_variables, 5)
            ));
        }
        if !self.missing_tables.is_empty() {
            lines.push(format!(
                "  missing tables: {}",
                truncated(&self.missing_tables, 5)
            ));
        }
        if !self.invalid_references.is_empty() {
            lines.push(format!(
                "  invalid references: {}",
                truncated(&self.invalid_references, 5)
            ));
        }
        for (item, locs) in self.context_locations.iter().take(5) {
            lines.push(format!("  {item} referenced at: {}", locs.join(", ")));
        }
        lines.join("\n")
    }
}

/// Aggregate dependency-resolution failure raised by the dependency graph.
#[derive(Debug, Error, Default)]
#[error("dependency resolution failed")]
pub struct DependencyError {
    pub cycles: Vec<Vec<String>>,
    pub missing_dependencies: Vec<String>,
    pub conflicting_dependencies: HashMap<String, Vec<String>>,
}

impl DependencyError {
    pub fn detailed_message(&self) -> String {
        let mut lines = vec!["dependency resolution failed".to_string()];
        for (i, cycle) in self.cycles.iter().enumerate() {
            lines.push(format!("  cycle {}: {}", i + 1, cycle.join(" -> ")));
        }
        if !self.missing_dependencies.is_empty() {
            lines.push(format!(
                "  missing dependencies: {}",
                truncated(&self.missing_dependencies, 5)
            ));
        }
        lines.join("\n")
    }
}

/// One or more operations failed to build from their source steps.
#[derive(Debug, Error, Default)]
#[error("failed to build steps")]
pub struct StepBuildError {
    pub failed_steps: Vec<String>,
    pub step_errors: HashMap<String, String>,
}

/// The CLI's `--variables` payload could not be parsed as JSON or `k=v` pairs.
#[derive(Debug, Error)]
#[error("could not parse --variables payload: {reason}")]
pub struct VariableParsingError {
    pub reason: String,
}

/// Catch-all for parser/planner failures not covered by a more specific type.
#[derive(Debug, Error)]
#[error("compilation failed: {message}")]
pub struct CompilationError {
    pub message: String,
}

/// A runtime failure during execution of one step.
#[derive(Debug, Error)]
#[error("step '{failed_step}' failed: {message}")]
pub struct ExecutionError {
    pub failed_step: String,
    pub message: String,
    #[source]
    pub cause: Option<anyhow::Error>,
}

/// An [`ExecutionError`] raised by a connector, flagged for retry-ability.
#[derive(Debug)]
pub struct ConnectorError {
    pub step_id: String,
    pub message: String,
    pub retryable: bool,
}

impl ConnectorError {
    pub fn not_implemented(connector_type: &str) -> Self {
        ConnectorError {
            step_id: connector_type.to_string(),
            message: format!(
                "connector type '{connector_type}' has no concrete implementation in this build"
            ),
            retryable: false,
        }
    }
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connector error in step '{}': {}{}",
            self.step_id,
            self.message,
            if self.retryable { " (retryable)" } else { "" }
        )
    }
}

impl std::error::Error for ConnectorError {}

/// Top-level error type returned by the CLI surface, unifying every class
/// above so callers can match on `SqlFlowError` without naming each type.
#[derive(Debug, Error)]
pub enum SqlFlowError {
    #[error(transparent)]
    PipelineNotFound(#[from] PipelineNotFound),
    #[error(transparent)]
    ProfileNotFound(#[from] ProfileNotFound),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Dependency(#[from] DependencyError),
    #[error(transparent)]
    StepBuild(#[from] StepBuildError),
    #[error(transparent)]
    VariableParsing(#[from] VariableParsingError),
    #[error(transparent)]
    Compilation(#[from] CompilationError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SqlFlowError {
    /// Exit code per the CLI contract in spec §6.5.
    pub fn exit_code(&self) -> i32 {
        match self {
            SqlFlowError::Validation(_) | SqlFlowError::Dependency(_) => 2,
            _ => 1,
        }
    }

    /// Rich, user-facing message: entity, context, first ≤5 issues,
    /// actionable suggestion(s), per spec §7's display requirement.
    pub fn detailed_message(&self) -> String {
        match self {
            SqlFlowError::PipelineNotFound(e) => e.detailed_message(),
            SqlFlowError::ProfileNotFound(e) => e.detailed_message(),
            SqlFlowError::Validation(e) => e.detailed_message(),
            SqlFlowError::Dependency(e) => e.detailed_message(),
            other => other.to_string(),
        }
    }
}
