//! Lowers a parsed [`Pipeline`] into a validated [`Plan`] of [`Operation`]s
//! (component C2). Grounded in `sqlflow/core/planner/planner.py`'s seven
//! step sequence: variable priority, conditional evaluation, lowering,
//! dependency inference, validation.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use sqlflow_core::ast::{Pipeline, Step};
use sqlflow_core::errors::handler::{ErrorHandler, ErrorStrategy};
use sqlflow_core::errors::{DependencyError, StepBuildError, ValidationError};
use sqlflow_core::op::{Operation, OperationKind, Plan};
use sqlflow_core::vars::{Context, VariableResolver};

use crate::expr::evaluate;
use crate::slug::SlugAllocator;
use crate::sql_refs::from_join_targets;

/// Registry of operations producing a named table, updated as steps lower
/// so later steps depend on the most recent producer (the `is_replace`
/// redefinition rule).
#[derive(Default)]
struct TableRegistry {
    producers: HashMap<String, String>,
}

impl TableRegistry {
    fn record(&mut self, table: &str, op_id: &str) {
        self.producers.insert(table.to_string(), op_id.to_string());
    }

    fn producer(&self, table: &str) -> Option<&str> {
        self.producers.get(table).map(String::as_str)
    }
}

pub struct Planner {
    resolver: VariableResolver,
    error_strategy: ErrorStrategy,
}

impl Planner {
    pub fn new(
        cli_vars: HashMap<String, Value>,
        profile_vars: HashMap<String, Value>,
        error_strategy: ErrorStrategy,
    ) -> Self {
        Self {
            resolver: VariableResolver::new(cli_vars, profile_vars),
            error_strategy,
        }
    }

    /// Plan a fully include-expanded pipeline into an ordered, validated
    /// operation list. `pipeline_name` is carried into the compiled plan
    /// artifact for diagnostics.
    pub fn plan(mut self, pipeline_name: &str, pipeline: &Pipeline) -> Result<Plan, PlannerError> {
        reject_unexpanded_includes(&pipeline.steps)?;

        let effective_steps = self.flatten(&pipeline.steps)?;

        let mut operations = Vec::new();
        let mut slugs = SlugAllocator::new();
        let mut tables = TableRegistry::default();
        let mut sources: HashMap<String, String> = HashMap::new();
        let mut seen_plain_create: HashSet<String> = HashSet::new();
        let mut var_locations: HashMap<String, Vec<String>> = HashMap::new();
        let mut missing_variables: HashSet<String> = HashSet::new();

        for step in &effective_steps {
            match step {
                Step::SourceDefinition(s) => {
                    self.collect_param_vars(&s.params, &mut var_locations, &mut missing_variables, &format!("source {}", s.name));

                    let id = slugs.allocate("source", &s.name);
                    sources.insert(s.name.clone(), id.clone());
                    operations.push(Operation {
                        id,
                        kind: OperationKind::SourceDefinition {
                            name: s.name.clone(),
                            connector_type: s.connector_type.clone(),
                            params: s.params.clone(),
                            is_from_profile: s.is_from_profile,
                            profile_connector_name: s.profile_connector_name.clone(),
                        },
                        depends_on: Vec::new(),
                        line_number: Some(s.line_number),
                    });
                }
                Step::Load(s) => {
                    if s.mode == sqlflow_core::ast::LoadMode::Upsert && s.upsert_keys.is_empty() {
                        return Err(PlannerError::Validation(ValidationError {
                            invalid_references: vec![format!(
                                "LOAD {} uses MODE UPSERT without a KEY clause",
                                s.table_name
                            )],
                            ..Default::default()
                        }));
                    }

                    let id = slugs.allocate("load", &s.table_name);
                    let mut depends_on = Vec::new();
                    if let Some(src_id) = sources.get(&s.source_name) {
                        depends_on.push(src_id.clone());
                    } else {
                        return Err(PlannerError::Dependency(DependencyError {
                            missing_dependencies: vec![format!(
                                "{id} -> source '{}' (no matching SOURCE definition)",
                                s.source_name
                            )],
                            ..Default::default()
                        }));
                    }

                    tables.record(&s.table_name, &id);
                    operations.push(Operation {
                        id,
                        kind: OperationKind::Load {
                            table_name: s.table_name.clone(),
                            source_name: s.source_name.clone(),
                            source_connector_type: None,
                            mode: s.mode,
                            upsert_keys: s.upsert_keys.clone(),
                        },
                        depends_on,
                        line_number: Some(s.line_number),
                    });
                }
                Step::SqlBlock(s) => {
                    use sqlflow_core::ast::TransformMode;
                    if matches!(s.mode, Some(TransformMode::Merge)) && s.merge_keys.is_empty() {
                        return Err(PlannerError::Validation(ValidationError {
                            invalid_references: vec![format!(
                                "CREATE TABLE {} MODE MERGE requires a KEY clause",
                                s.table_name
                            )],
                            ..Default::default()
                        }));
                    }
                    if matches!(s.mode, Some(TransformMode::Incremental)) && s.time_column.is_none() {
                        return Err(PlannerError::Validation(ValidationError {
                            invalid_references: vec![format!(
                                "CREATE TABLE {} MODE INCREMENTAL requires a BY column",
                                s.table_name
                            )],
                            ..Default::default()
                        }));
                    }
                    if !s.is_replace && !seen_plain_create.insert(s.table_name.clone()) {
                        return Err(PlannerError::Validation(ValidationError {
                            invalid_references: vec![format!(
                                "duplicate CREATE TABLE for '{}' without OR REPLACE",
                                s.table_name
                            )],
                            ..Default::default()
                        }));
                    }

                    self.collect_text_vars(&s.sql_query, &mut var_locations, &mut missing_variables, &format!("transform {}", s.table_name));

                    let id = slugs.allocate("transform", &s.table_name);
                    let depends_on = self.infer_dependencies(&s.sql_query, &tables);

                    tables.record(&s.table_name, &id);
                    operations.push(Operation {
                        id,
                        kind: OperationKind::Transform {
                            table_name: s.table_name.clone(),
                            sql_query: s.sql_query.clone(),
                            mode: s.mode,
                            is_replace: s.is_replace,
                            merge_keys: s.merge_keys.clone(),
                            time_column: s.time_column.clone(),
                            lookback: s.lookback.clone(),
                        },
                        depends_on,
                        line_number: Some(s.line_number),
                    });
                }
                Step::Export(s) => {
                    self.collect_text_vars(&s.sql_query, &mut var_locations, &mut missing_variables, "export");
                    self.collect_text_vars(&s.destination_uri, &mut var_locations, &mut missing_variables, "export destination");
                    self.collect_param_vars(&s.options, &mut var_locations, &mut missing_variables, "export options");

                    let id = slugs.allocate("export", &format!("{}", operations.len()));
                    let depends_on = self.infer_dependencies(&s.sql_query, &tables);

                    operations.push(Operation {
                        id,
                        kind: OperationKind::Export {
                            sql_query: s.sql_query.clone(),
                            destination_uri: s.destination_uri.clone(),
                            connector_type: s.connector_type.clone(),
                            options: s.options.clone(),
                        },
                        depends_on,
                        line_number: Some(s.line_number),
                    });
                }
                Step::Set(_) | Step::Include(_) | Step::ConditionalBlock(_) => {
                    unreachable!("flatten() already resolved Set/Include/ConditionalBlock steps")
                }
            }
        }

        let missing_tables = self.missing_tables(&operations, &tables);
        if !missing_variables.is_empty() || !missing_tables.is_empty() {
            return Err(PlannerError::Validation(ValidationError {
                missing_variables: missing_variables.into_iter().collect(),
                missing_tables,
                invalid_references: Vec::new(),
                context_locations: var_locations,
            }));
        }

        Ok(Plan {
            pipeline_name: pipeline_name.to_string(),
            operations,
        })
    }

    /// Flattens `SET`/`ConditionalBlock`/`Include` control-flow steps into
    /// the sequence of steps that actually get lowered to operations,
    /// mutating the resolver's `SET` layer as declarations are encountered.
    fn flatten(&mut self, steps: &[Step]) -> Result<Vec<Step>, PlannerError> {
        let mut out = Vec::new();
        for step in steps {
            match step {
                Step::Set(s) => {
                    let mut handler = ErrorHandler::new(ErrorStrategy::Ignore);
                    let (value, _) = self.resolver.render(&s.variable_value, Context::Text, &mut handler);
                    self.resolver.declare_set_var(s.variable_name.clone(), value);
                }
                Step::Include(_) => {
                    return Err(PlannerError::StepBuild(StepBuildError {
                        failed_steps: vec!["include".to_string()],
                        step_errors: [("include".to_string(), "unexpanded INCLUDE reached the planner".to_string())]
                            .into_iter()
                            .collect(),
                    }));
                }
                Step::ConditionalBlock(cb) => {
                    let mut taken: Option<&[Step]> = None;
                    for branch in &cb.branches {
                        let mut handler = ErrorHandler::new(self.error_strategy);
                        let (rendered, _) = self.resolver.render(&branch.condition, Context::Ast, &mut handler);
                        let is_true = evaluate(&rendered).map_err(|e| {
                            PlannerError::StepBuild(StepBuildError {
                                failed_steps: vec!["conditional_block".to_string()],
                                step_errors: [("condition".to_string(), e.0)].into_iter().collect(),
                            })
                        })?;
                        if is_true {
                            taken = Some(branch.steps.as_slice());
                            break;
                        }
                    }
                    let taken = taken.or(cb.else_branch.as_deref());
                    if let Some(steps) = taken {
                        out.extend(self.flatten(steps)?);
                    }
                }
                other => out.push(other.clone()),
            }
        }
        Ok(out)
    }

    fn infer_dependencies(&self, sql: &str, tables: &TableRegistry) -> Vec<String> {
        let mut deps: Vec<String> = from_join_targets(sql)
            .into_iter()
            .filter_map(|t| tables.producer(&t).map(str::to_string))
            .collect();
        deps.sort_unstable();
        deps.dedup();
        deps
    }

    fn missing_tables(&self, operations: &[Operation], tables: &TableRegistry) -> Vec<String> {
        let mut missing = HashSet::new();
        for op in operations {
            let sql = match &op.kind {
                OperationKind::Transform { sql_query, .. } => sql_query,
                OperationKind::Export { sql_query, .. } => sql_query,
                _ => continue,
            };
            for target in from_join_targets(sql) {
                if tables.producer(&target).is_none() {
                    missing.insert(target);
                }
            }
        }
        missing.into_iter().collect()
    }

    fn collect_text_vars(
        &self,
        text: &str,
        locations: &mut HashMap<String, Vec<String>>,
        missing: &mut HashSet<String>,
        where_: &str,
    ) {
        for (name, default) in VariableResolver::variables_in(text) {
            locations.entry(name.clone()).or_default().push(where_.to_string());
            if default.is_none() && self.resolver.resolve(&name).is_none() {
                missing.insert(name);
            }
        }
    }

    fn collect_param_vars(
        &self,
        params: &HashMap<String, Value>,
        locations: &mut HashMap<String, Vec<String>>,
        missing: &mut HashSet<String>,
        where_: &str,
    ) {
        for value in params.values() {
            self.collect_value_vars(value, locations, missing, where_);
        }
    }

    fn collect_value_vars(
        &self,
        value: &Value,
        locations: &mut HashMap<String, Vec<String>>,
        missing: &mut HashSet<String>,
        where_: &str,
    ) {
        match value {
            Value::String(s) => self.collect_text_vars(s, locations, missing, where_),
            Value::Array(items) => {
                for item in items {
                    self.collect_value_vars(item, locations, missing, where_);
                }
            }
            Value::Object(map) => {
                for v in map.values() {
                    self.collect_value_vars(v, locations, missing, where_);
                }
            }
            _ => {}
        }
    }
}

fn reject_unexpanded_includes(steps: &[Step]) -> Result<(), PlannerError> {
    for step in steps {
        match step {
            Step::Include(_) => {
                return Err(PlannerError::StepBuild(StepBuildError {
                    failed_steps: vec!["include".to_string()],
                    step_errors: [("include".to_string(), "unexpanded INCLUDE reached the planner".to_string())]
                        .into_iter()
                        .collect(),
                }))
            }
            Step::ConditionalBlock(cb) => {
                for branch in &cb.branches {
                    reject_unexpanded_includes(&branch.steps)?;
                }
                if let Some(else_steps) = &cb.else_branch {
                    reject_unexpanded_includes(else_steps)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Dependency(#[from] DependencyError),
    #[error(transparent)]
    StepBuild(#[from] StepBuildError),
}
