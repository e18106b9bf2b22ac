//! The SQLFlow DSL abstract syntax tree.
//!
//! AST entities are created by [`sqlflow_parser`](../sqlflow_parser/index.html)
//! and are read-only from this point forward: a `Pipeline` is immutable once
//! parsed. Every variant carries a `line_number` so later stages (the
//! planner, the variable resolver) can surface diagnostics pointing back at
//! the source text.

use std::collections::HashMap;

use serde_json::Value;

/// Materialization mode for a `LOAD ... MODE` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadMode {
    Replace,
    Append,
    Upsert,
}

impl LoadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadMode::Replace => "REPLACE",
            LoadMode::Append => "APPEND",
            LoadMode::Upsert => "UPSERT",
        }
    }
}

/// Materialization mode for a `CREATE TABLE ... MODE` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformMode {
    Replace,
    Append,
    Merge,
    Incremental,
}

impl TransformMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformMode::Replace => "REPLACE",
            TransformMode::Append => "APPEND",
            TransformMode::Merge => "MERGE",
            TransformMode::Incremental => "INCREMENTAL",
        }
    }
}

/// `SOURCE name TYPE ... PARAMS {...}` or `SOURCE name FROM "profile_connector" [OPTIONS {...}]`.
#[derive(Debug, Clone)]
pub struct SourceDefinitionStep {
    pub name: String,
    pub connector_type: String,
    pub params: HashMap<String, Value>,
    pub is_from_profile: bool,
    pub profile_connector_name: Option<String>,
    pub line_number: u32,
}

/// `LOAD table FROM source [MODE ... [KEY (...)]]`.
#[derive(Debug, Clone)]
pub struct LoadStep {
    pub table_name: String,
    pub source_name: String,
    pub mode: LoadMode,
    pub upsert_keys: Vec<String>,
    pub line_number: u32,
}

/// `CREATE [OR REPLACE] TABLE name [MODE ...] AS <select>`.
#[derive(Debug, Clone)]
pub struct SqlBlockStep {
    pub table_name: String,
    pub sql_query: String,
    pub mode: Option<TransformMode>,
    pub is_replace: bool,
    pub merge_keys: Vec<String>,
    pub time_column: Option<String>,
    pub lookback: Option<String>,
    pub line_number: u32,
}

/// `EXPORT <select> TO "uri" TYPE ident OPTIONS {...}`.
#[derive(Debug, Clone)]
pub struct ExportStep {
    pub sql_query: String,
    pub destination_uri: String,
    pub connector_type: String,
    pub options: HashMap<String, Value>,
    pub line_number: u32,
}

/// `SET name = value`.
#[derive(Debug, Clone)]
pub struct SetStep {
    pub variable_name: String,
    pub variable_value: String,
    pub line_number: u32,
}

/// `INCLUDE "path" AS alias`. Resolved (expanded) before planning; the
/// planner only checks for cycles among include aliases.
#[derive(Debug, Clone)]
pub struct IncludeStep {
    pub file_path: String,
    pub alias: String,
    pub line_number: u32,
}

/// One `IF`/`ELSE IF` arm: a condition expression plus the steps it guards.
#[derive(Debug, Clone)]
pub struct Branch {
    pub condition: String,
    pub steps: Vec<Step>,
}

/// `IF ... THEN ... [ELSE IF ... THEN ...]* [ELSE ...] END IF`.
#[derive(Debug, Clone)]
pub struct ConditionalBlockStep {
    pub branches: Vec<Branch>,
    pub else_branch: Option<Vec<Step>>,
    pub line_number: u32,
}

/// One statement in a parsed pipeline.
#[derive(Debug, Clone)]
pub enum Step {
    SourceDefinition(SourceDefinitionStep),
    Load(LoadStep),
    SqlBlock(SqlBlockStep),
    Export(ExportStep),
    Set(SetStep),
    Include(IncludeStep),
    ConditionalBlock(ConditionalBlockStep),
}

impl Step {
    pub fn line_number(&self) -> u32 {
        match self {
            Step::SourceDefinition(s) => s.line_number,
            Step::Load(s) => s.line_number,
            Step::SqlBlock(s) => s.line_number,
            Step::Export(s) => s.line_number,
            Step::Set(s) => s.line_number,
            Step::Include(s) => s.line_number,
            Step::ConditionalBlock(s) => s.line_number,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Step::SourceDefinition(_) => "source_definition",
            Step::Load(_) => "load",
            Step::SqlBlock(_) => "transform",
            Step::Export(_) => "export",
            Step::Set(_) => "set",
            Step::Include(_) => "include",
            Step::ConditionalBlock(_) => "conditional_block",
        }
    }
}

/// An ordered sequence of [`Step`]s. Immutable once parsed.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub steps: Vec<Step>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn add_step(&mut self, step: Step) {
        self.steps.push(step);
    }
}
