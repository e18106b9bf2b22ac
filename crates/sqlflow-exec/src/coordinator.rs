//! Owns a run: builds the dependency graph, picks a strategy, and schedules
//! operations level by level with fail-fast-per-level semantics (C6).

use std::collections::HashSet;
use std::sync::Arc;

use sqlflow_core::graph::DependencyGraph;
use sqlflow_core::op::{Operation, Plan};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::executor::{executor_for, StepResult, StepStatus};
use crate::observability::ObservabilityManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Compatibility,
    Auto,
    MemoryOptimized,
    SpeedOptimized,
    Hybrid,
}

impl Strategy {
    pub fn from_profile(name: Option<&str>) -> Self {
        match name {
            Some("compatibility") => Strategy::Compatibility,
            Some("memory_optimized") => Strategy::MemoryOptimized,
            Some("speed_optimized") => Strategy::SpeedOptimized,
            Some("hybrid") => Strategy::Hybrid,
            _ => Strategy::Auto,
        }
    }

    /// How many steps of one level may run concurrently under this strategy.
    fn max_concurrent(&self) -> usize {
        match self {
            Strategy::Compatibility => 1,
            Strategy::Auto => 5,
            Strategy::MemoryOptimized => 1,
            Strategy::SpeedOptimized => 10,
            Strategy::Hybrid => 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub success: bool,
    pub results: Vec<StepResult>,
    pub first_error: Option<String>,
}

pub struct Coordinator {
    strategy: Strategy,
    observability: Arc<ObservabilityManager>,
}

impl Coordinator {
    pub fn new(strategy: Strategy, run_id: impl Into<String>) -> Self {
        Self {
            strategy,
            observability: Arc::new(ObservabilityManager::new(run_id)),
        }
    }

    pub fn observability(&self) -> Arc<ObservabilityManager> {
        self.observability.clone()
    }

    pub async fn run(
        &self,
        plan: &Plan,
        mut ctx: ExecutionContext,
        cancel: CancellationToken,
    ) -> anyhow::Result<RunResult> {
        let graph = DependencyGraph::build(&plan.operations)?;
        let levels = graph.topological_levels();

        let mut completed: HashSet<String> = HashSet::new();
        let mut results = Vec::new();
        let mut first_error = None;
        let mut skipped_rest = false;

        for level in levels {
            if skipped_rest || cancel.is_cancelled() {
                for id in &level {
                    results.push(StepResult::skipped(id, "upstream_failure"));
                }
                continue;
            }

            let ops: Vec<Operation> = level
                .iter()
                .filter_map(|id| graph.operation(id).cloned())
                .collect();

            let level_results = self.run_level(ops, &ctx, &cancel).await;

            let mut level_failed = false;
            for (result, delta) in level_results {
                if let Some(delta) = delta {
                    ctx = delta;
                }
                self.record(&result);
                if result.status == StepStatus::Error {
                    level_failed = true;
                    if first_error.is_none() {
                        first_error = result.error_message.clone();
                    }
                } else {
                    completed.insert(result.step_id.clone());
                }
                results.push(result);
            }

            if level_failed {
                skipped_rest = true;
            }
        }

        Ok(RunResult {
            success: first_error.is_none(),
            results,
            first_error,
        })
    }

    async fn run_level(
        &self,
        ops: Vec<Operation>,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Vec<(StepResult, Option<ExecutionContext>)> {
        let max_concurrent = self.strategy.max_concurrent();
        let mut out = Vec::with_capacity(ops.len());
        let mut chunks = ops.chunks(max_concurrent.max(1));

        while let Some(chunk) = chunks.next() {
            let mut set = JoinSet::new();
            for op in chunk.to_vec() {
                let ctx = ctx.clone();
                let cancel = cancel.clone();
                set.spawn(async move {
                    match executor_for(&op) {
                        Some(executor) => executor.execute(&op, &ctx, &cancel).await,
                        None => (
                            StepResult {
                                step_id: op.id.clone(),
                                status: StepStatus::Error,
                                message: "no executor".to_string(),
                                error_message: Some(format!("NoExecutor for operation kind '{}'", op.type_name())),
                                execution_time_ms: 0,
                                row_count: None,
                            },
                            None,
                        ),
                    }
                });
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(pair) => out.push(pair),
                    Err(e) => out.push((
                        StepResult {
                            step_id: "unknown".to_string(),
                            status: StepStatus::Error,
                            message: "executor task panicked".to_string(),
                            error_message: Some(e.to_string()),
                            execution_time_ms: 0,
                            row_count: None,
                        },
                        None,
                    )),
                }
            }
        }
        out
    }

    fn record(&self, result: &StepResult) {
        match result.status {
            StepStatus::Success => {
                self.observability.record_step_success(
                    step_type_of(&result.step_id),
                    result.execution_time_ms,
                    result.row_count.unwrap_or(0) as u64,
                );
            }
            StepStatus::Error => {
                self.observability.record_step_failure(
                    step_type_of(&result.step_id),
                    result.execution_time_ms,
                    result.error_message.as_deref().unwrap_or("unknown error"),
                );
            }
            _ => {}
        }
    }
}

/// `source_customers` -> `source`, `transform_clean` -> `transform`. Falls
/// back to the whole id when there's no underscore (shouldn't happen for
/// planner-generated ids).
fn step_type_of(step_id: &str) -> &str {
    step_id.split('_').next().unwrap_or(step_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use sqlflow_core::errors::handler::ErrorStrategy;
    use sqlflow_core::op::OperationKind;
    use sqlflow_core::vars::VariableResolver;

    fn transform(id: &str, table: &str, sql: &str, deps: &[&str]) -> Operation {
        Operation {
            id: id.to_string(),
            kind: OperationKind::Transform {
                table_name: table.to_string(),
                sql_query: sql.to_string(),
                mode: None,
                is_replace: false,
                merge_keys: vec![],
                time_column: None,
                lookback: None,
            },
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            line_number: None,
        }
    }

    fn make_ctx() -> ExecutionContext {
        ExecutionContext::new(
            Arc::new(datafusion::execution::context::SessionContext::new()),
            Arc::new(VariableResolver::new(HashMap::new(), HashMap::new())),
            ErrorStrategy::WarnContinue,
        )
    }

    #[tokio::test]
    async fn runs_levels_in_dependency_order() {
        let plan = Plan {
            pipeline_name: "p".into(),
            operations: vec![
                transform("transform_a", "a", "SELECT 1 AS x", &[]),
                transform("transform_b", "b", "SELECT * FROM a", &["transform_a"]),
            ],
        };

        let coordinator = Coordinator::new(Strategy::Auto, "run-1");
        let result = coordinator.run(&plan, make_ctx(), CancellationToken::new()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.results.len(), 2);
    }

    #[tokio::test]
    async fn failure_skips_dependents_and_later_levels() {
        let plan = Plan {
            pipeline_name: "p".into(),
            operations: vec![
                transform("transform_a", "a", "SELECT * FROM does_not_exist", &[]),
                transform("transform_b", "b", "SELECT * FROM a", &["transform_a"]),
            ],
        };

        let coordinator = Coordinator::new(Strategy::Auto, "run-1");
        let result = coordinator.run(&plan, make_ctx(), CancellationToken::new()).await.unwrap();
        assert!(!result.success);
        let skipped = result
            .results
            .iter()
            .find(|r| r.step_id == "transform_b")
            .unwrap();
        assert_eq!(skipped.status, StepStatus::Skipped);
    }
}
