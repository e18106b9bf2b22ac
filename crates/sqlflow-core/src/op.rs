//! The planner's output representation.
//!
//! `Operation` is a tagged sum type internally (so executor dispatch is a
//! plain `match`), but serializes to the flat dictionary shape the compiled
//! plan artifact (`sqlflow pipeline compile`) requires — see `to_json`.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::ast::{LoadMode, TransformMode};

/// The typed payload of one planner-emitted operation.
#[derive(Debug, Clone)]
pub enum OperationKind {
    SourceDefinition {
        name: String,
        connector_type: String,
        params: HashMap<String, Value>,
        is_from_profile: bool,
        profile_connector_name: Option<String>,
    },
    Load {
        table_name: String,
        source_name: String,
        source_connector_type: Option<String>,
        mode: LoadMode,
        upsert_keys: Vec<String>,
    },
    Transform {
        table_name: String,
        sql_query: String,
        mode: Option<TransformMode>,
        is_replace: bool,
        merge_keys: Vec<String>,
        time_column: Option<String>,
        lookback: Option<String>,
    },
    Export {
        sql_query: String,
        destination_uri: String,
        connector_type: String,
        options: HashMap<String, Value>,
    },
}

impl OperationKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            OperationKind::SourceDefinition { .. } => "source_definition",
            OperationKind::Load { .. } => "load",
            OperationKind::Transform { .. } => "transform",
            OperationKind::Export { .. } => "export",
        }
    }
}

/// One unit of planned work with a stable id and explicit dependency edges.
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: String,
    pub kind: OperationKind,
    pub depends_on: Vec<String>,
    pub line_number: Option<u32>,
}

impl Operation {
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Logical name: the source name for a `source_definition`, the target
    /// table for `load`/`transform`, or `None` for `export` (ad-hoc query).
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            OperationKind::SourceDefinition { name, .. } => Some(name),
            OperationKind::Load { table_name, .. } => Some(table_name),
            OperationKind::Transform { table_name, .. } => Some(table_name),
            OperationKind::Export { .. } => None,
        }
    }

    pub fn target_table(&self) -> Option<&str> {
        match &self.kind {
            OperationKind::Load { table_name, .. } => Some(table_name),
            OperationKind::Transform { table_name, .. } => Some(table_name),
            _ => None,
        }
    }

    pub fn source_name(&self) -> Option<&str> {
        match &self.kind {
            OperationKind::Load { source_name, .. } => Some(source_name),
            _ => None,
        }
    }

    pub fn is_replace(&self) -> bool {
        matches!(
            &self.kind,
            OperationKind::Transform {
                is_replace: true,
                ..
            }
        )
    }

    /// Serialize to the flat shape documented for the compiled plan JSON
    /// artifact (`<output_dir>/compiled/<pipeline>.json`).
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("id".into(), json!(self.id));
        obj.insert("type".into(), json!(self.type_name()));
        obj.insert("name".into(), json!(self.name()));
        obj.insert("depends_on".into(), json!(self.depends_on));
        if let Some(ln) = self.line_number {
            obj.insert("line_number".into(), json!(ln));
        }

        match &self.kind {
            OperationKind::SourceDefinition {
                name: _,
                connector_type,
                params,
                is_from_profile,
                profile_connector_name,
            } => {
                obj.insert("query".into(), json!(params));
                obj.insert("source_connector_type".into(), json!(connector_type));
                obj.insert("is_from_profile".into(), json!(is_from_profile));
                if let Some(p) = profile_connector_name {
                    obj.insert("profile_connector_name".into(), json!(p));
                }
            }
            OperationKind::Load {
                table_name,
                source_name,
                source_connector_type,
                mode,
                upsert_keys,
            } => {
                obj.insert(
                    "query".into(),
                    json!({ "table_name": table_name, "source_name": source_name }),
                );
                obj.insert("target_table".into(), json!(table_name));
                obj.insert("source_name".into(), json!(source_name));
                obj.insert("mode".into(), json!(mode.as_str()));
                obj.insert("upsert_keys".into(), json!(upsert_keys));
                if let Some(ct) = source_connector_type {
                    obj.insert("source_connector_type".into(), json!(ct));
                }
            }
            OperationKind::Transform {
                table_name,
                sql_query,
                mode,
                is_replace,
                merge_keys,
                time_column,
                lookback,
            } => {
                obj.insert("query".into(), json!(sql_query));
                obj.insert("target_table".into(), json!(table_name));
                obj.insert("mode".into(), json!(mode.map(|m| m.as_str())));
                obj.insert("is_replace".into(), json!(is_replace));
                obj.insert("merge_keys".into(), json!(merge_keys));
                obj.insert("time_column".into(), json!(time_column));
                obj.insert("lookback".into(), json!(lookback));
            }
            OperationKind::Export {
                sql_query,
                destination_uri,
                connector_type,
                options,
            } => {
                obj.insert("query".into(), json!(sql_query));
                obj.insert("destination_uri".into(), json!(destination_uri));
                obj.insert("source_connector_type".into(), json!(connector_type));
                obj.insert("options".into(), json!(options));
            }
        }

        Value::Object(obj)
    }
}

/// The compiled plan artifact written by `sqlflow pipeline compile`.
#[derive(Debug, Clone)]
pub struct Plan {
    pub pipeline_name: String,
    pub operations: Vec<Operation>,
}

impl Plan {
    pub fn to_json(&self) -> Value {
        json!({
            "pipeline_name": self.pipeline_name,
            "operation_count": self.operations.len(),
            "operations": self.operations.iter().map(Operation::to_json).collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_json_has_flat_shape() {
        let op = Operation {
            id: "transform_clean".into(),
            kind: OperationKind::Transform {
                table_name: "clean".into(),
                sql_query: "SELECT 1".into(),
                mode: None,
                is_replace: false,
                merge_keys: vec![],
                time_column: None,
                lookback: None,
            },
            depends_on: vec!["load_raw".into()],
            line_number: Some(3),
        };
        let v = op.to_json();
        assert_eq!(v["id"], "transform_clean");
        assert_eq!(v["type"], "transform");
        assert_eq!(v["target_table"], "clean");
        assert_eq!(v["depends_on"][0], "load_raw");
    }
}
