//! Polymorphic handlers for the four operation kinds (C5). Each executor
//! answers `can_execute`, then runs `execute` (blocking: one `StepResult`) or
//! `execute_stream` (progress records, for the streaming strategies).

use std::time::Instant;

use async_trait::async_trait;
use sqlflow_core::errors::ConnectorError;
use sqlflow_core::op::{Operation, OperationKind};
use sqlflow_core::vars::Context;
use sqlflow_io::connector::{DestinationConnector, SourceConnector};
use sqlflow_io::factory;
use tokio_util::sync::CancellationToken;

use crate::context::{ExecutionContext, SourceHandle};
use crate::materialize::{statements_for, MaterializeRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Error,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    pub message: String,
    pub error_message: Option<String>,
    pub execution_time_ms: u128,
    pub row_count: Option<usize>,
}

impl StepResult {
    fn success(step_id: &str, message: impl Into<String>, elapsed: Instant, row_count: Option<usize>) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Success,
            message: message.into(),
            error_message: None,
            execution_time_ms: elapsed.elapsed().as_millis(),
            row_count,
        }
    }

    fn error(step_id: &str, err: impl std::fmt::Display, elapsed: Instant) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Error,
            message: "step failed".to_string(),
            error_message: Some(err.to_string()),
            execution_time_ms: elapsed.elapsed().as_millis(),
            row_count: None,
        }
    }

    pub fn skipped(step_id: &str, reason: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Skipped,
            message: reason.to_string(),
            error_message: None,
            execution_time_ms: 0,
            row_count: None,
        }
    }
}

/// One progress record from a streaming executor.
#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub chunk_idx: usize,
    pub rows_in_chunk: usize,
    pub total_rows: Option<usize>,
    pub status: StepStatus,
}

#[async_trait]
pub trait StepExecutor: Send + Sync {
    fn can_execute(&self, op: &Operation) -> bool;

    async fn execute(
        &self,
        op: &Operation,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> (StepResult, Option<ExecutionContext>);

    /// Default streaming variant: run `execute` to completion and report it
    /// as a single chunk. Executors with real chunking (load, export)
    /// override this.
    async fn execute_stream(
        &self,
        op: &Operation,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> (Vec<ProgressRecord>, StepResult, Option<ExecutionContext>) {
        let (result, delta) = self.execute(op, ctx, cancel).await;
        let progress = vec![ProgressRecord {
            chunk_idx: 0,
            rows_in_chunk: result.row_count.unwrap_or(0),
            total_rows: result.row_count,
            status: result.status,
        }];
        (progress, result, delta)
    }
}

fn render_sql(sql: &str, ctx: &ExecutionContext) -> String {
    let mut handler = sqlflow_core::errors::handler::ErrorHandler::new(ctx.error_strategy);
    ctx.resolver.render(sql, Context::Sql, &mut handler).0
}

pub struct SourceDefinitionExecutor;

#[async_trait]
impl StepExecutor for SourceDefinitionExecutor {
    fn can_execute(&self, op: &Operation) -> bool {
        matches!(op.kind, OperationKind::SourceDefinition { .. })
    }

    async fn execute(
        &self,
        op: &Operation,
        ctx: &ExecutionContext,
        _cancel: &CancellationToken,
    ) -> (StepResult, Option<ExecutionContext>) {
        let start = Instant::now();
        let OperationKind::SourceDefinition {
            name,
            connector_type,
            params,
            is_from_profile,
            ..
        } = &op.kind
        else {
            unreachable!("can_execute guarantees SourceDefinition");
        };

        let mut connector = match factory::build_source(connector_type) {
            Ok(c) => c,
            Err(e) => return (StepResult::error(&op.id, e, start), None),
        };
        if let Err(e) = connector.configure(params) {
            return (StepResult::error(&op.id, e, start), None);
        }

        let handle = SourceHandle {
            name: name.clone(),
            connector_type: connector_type.clone(),
            params: params.clone(),
            is_from_profile: *is_from_profile,
        };
        let delta = ctx.with_source(handle);

        (
            StepResult::success(&op.id, format!("registered source '{name}'"), start, None),
            Some(delta),
        )
    }
}

pub struct LoadExecutor;

#[async_trait]
impl StepExecutor for LoadExecutor {
    fn can_execute(&self, op: &Operation) -> bool {
        matches!(op.kind, OperationKind::Load { .. })
    }

    async fn execute(
        &self,
        op: &Operation,
        ctx: &ExecutionContext,
        _cancel: &CancellationToken,
    ) -> (StepResult, Option<ExecutionContext>) {
        let start = Instant::now();
        let OperationKind::Load {
            table_name,
            source_name,
            mode,
            upsert_keys,
            ..
        } = &op.kind
        else {
            unreachable!("can_execute guarantees Load");
        };

        let Some(handle) = ctx.source(source_name) else {
            return (
                StepResult::error(&op.id, format!("no registered source '{source_name}'"), start),
                None,
            );
        };

        let mut connector = match factory::build_source(&handle.connector_type) {
            Ok(c) => c,
            Err(e) => return (StepResult::error(&op.id, e, start), None),
        };
        if let Err(e) = connector.configure(&handle.params) {
            return (StepResult::error(&op.id, e, start), None);
        }

        let staging_table = format!("__sqlflow_staging_{table_name}");
        if let Err(e) = connector.register(&ctx.engine, &staging_table).await {
            return (StepResult::error(&op.id, e, start), None);
        }

        let table_exists = ctx.engine.table_exist(table_name).unwrap_or(false);
        let select_sql = format!("SELECT * FROM {staging_table}");

        use sqlflow_core::ast::{LoadMode, TransformMode};
        let transform_mode = match mode {
            LoadMode::Replace => Some(TransformMode::Replace),
            LoadMode::Append => Some(TransformMode::Append),
            LoadMode::Upsert => Some(TransformMode::Merge),
        };

        let req = MaterializeRequest {
            table_name,
            select_sql: &select_sql,
            mode: transform_mode,
            merge_keys: upsert_keys,
            time_column: None,
            lookback: None,
            table_exists,
        };

        match run_statements(&ctx.engine, &statements_for(&req)).await {
            Ok(row_count) => (
                StepResult::success(&op.id, format!("loaded into '{table_name}'"), start, row_count),
                None,
            ),
            Err(e) => (StepResult::error(&op.id, e, start), None),
        }
    }
}

pub struct TransformExecutor;

#[async_trait]
impl StepExecutor for TransformExecutor {
    fn can_execute(&self, op: &Operation) -> bool {
        matches!(op.kind, OperationKind::Transform { .. })
    }

    async fn execute(
        &self,
        op: &Operation,
        ctx: &ExecutionContext,
        _cancel: &CancellationToken,
    ) -> (StepResult, Option<ExecutionContext>) {
        let start = Instant::now();
        let OperationKind::Transform {
            table_name,
            sql_query,
            mode,
            merge_keys,
            time_column,
            lookback,
            ..
        } = &op.kind
        else {
            unreachable!("can_execute guarantees Transform");
        };

        let rendered = render_sql(sql_query, ctx);
        let table_exists = ctx.engine.table_exist(table_name).unwrap_or(false);

        let req = MaterializeRequest {
            table_name,
            select_sql: &rendered,
            mode: *mode,
            merge_keys,
            time_column: time_column.as_deref(),
            lookback: lookback.as_deref(),
            table_exists,
        };

        match run_statements(&ctx.engine, &statements_for(&req)).await {
            Ok(row_count) => (
                StepResult::success(&op.id, format!("materialized '{table_name}'"), start, row_count),
                None,
            ),
            Err(e) => (StepResult::error(&op.id, e, start), None),
        }
    }
}

pub struct ExportExecutor;

#[async_trait]
impl StepExecutor for ExportExecutor {
    fn can_execute(&self, op: &Operation) -> bool {
        matches!(op.kind, OperationKind::Export { .. })
    }

    async fn execute(
        &self,
        op: &Operation,
        ctx: &ExecutionContext,
        _cancel: &CancellationToken,
    ) -> (StepResult, Option<ExecutionContext>) {
        let start = Instant::now();
        let OperationKind::Export {
            sql_query,
            destination_uri,
            connector_type,
            options,
        } = &op.kind
        else {
            unreachable!("can_execute guarantees Export");
        };

        let rendered_sql = render_sql(sql_query, ctx);
        let rendered_uri = render_sql(destination_uri, ctx);

        let mut connector: Box<dyn DestinationConnector> = match factory::build_destination(connector_type) {
            Ok(c) => c,
            Err(e) => return (StepResult::error(&op.id, e, start), None),
        };
        if let Err(e) = connector.configure(&rendered_uri, options) {
            return (StepResult::error(&op.id, e, start), None);
        }

        match connector.write(&ctx.engine, &rendered_sql).await {
            Ok(()) => (
                StepResult::success(&op.id, format!("exported to '{rendered_uri}'"), start, None),
                None,
            ),
            Err(e) => (StepResult::error(&op.id, e, start), None),
        }
    }
}

/// Runs a statement sequence against the engine, stopping at the first
/// error. Returns the affected row count of the last statement, when the
/// engine reports one.
async fn run_statements(
    engine: &datafusion::execution::context::SessionContext,
    statements: &[String],
) -> Result<Option<usize>, ConnectorError> {
    let mut last_rows = None;
    for stmt in statements {
        let df = engine.sql(stmt).await.map_err(|e| ConnectorError {
            step_id: stmt.clone(),
            message: format!("failed to plan statement: {e}"),
            retryable: false,
        })?;
        let batches = df.collect().await.map_err(|e| ConnectorError {
            step_id: stmt.clone(),
            message: format!("failed to execute statement: {e}"),
            retryable: true,
        })?;
        last_rows = Some(batches.iter().map(|b| b.num_rows()).sum());
    }
    Ok(last_rows)
}

/// Returns the executor registered to handle `op`, or `None` if no executor
/// claims it (the coordinator reports this as `NoExecutor`).
pub fn executor_for(op: &Operation) -> Option<Box<dyn StepExecutor>> {
    let candidates: Vec<Box<dyn StepExecutor>> = vec![
        Box::new(SourceDefinitionExecutor),
        Box::new(LoadExecutor),
        Box::new(TransformExecutor),
        Box::new(ExportExecutor),
    ];
    candidates.into_iter().find(|e| e.can_execute(op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn make_ctx() -> ExecutionContext {
        ExecutionContext::new(
            Arc::new(datafusion::execution::context::SessionContext::new()),
            Arc::new(sqlflow_core::vars::VariableResolver::new(HashMap::new(), HashMap::new())),
            sqlflow_core::errors::handler::ErrorStrategy::WarnContinue,
        )
    }

    #[tokio::test]
    async fn transform_executes_default_mode() {
        let ctx = make_ctx();
        ctx.engine
            .sql("CREATE TABLE raw AS SELECT 1 AS id")
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();

        let op = Operation {
            id: "transform_clean".into(),
            kind: OperationKind::Transform {
                table_name: "clean".into(),
                sql_query: "SELECT * FROM raw".into(),
                mode: None,
                is_replace: false,
                merge_keys: vec![],
                time_column: None,
                lookback: None,
            },
            depends_on: vec![],
            line_number: None,
        };

        let (result, _) = TransformExecutor.execute(&op, &ctx, &CancellationToken::new()).await;
        assert_eq!(result.status, StepStatus::Success);
        assert!(ctx.engine.table_exist("clean").unwrap());
    }

    #[test]
    fn executor_for_dispatches_by_kind() {
        let op = Operation {
            id: "export_0".into(),
            kind: OperationKind::Export {
                sql_query: "SELECT 1".into(),
                destination_uri: "out.csv".into(),
                connector_type: "csv".into(),
                options: HashMap::new(),
            },
            depends_on: vec![],
            line_number: None,
        };
        assert!(executor_for(&op).is_some());
    }
}
