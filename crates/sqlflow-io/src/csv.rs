//! Concrete CSV source/destination connectors — the pair needed to run the
//! spec's scenario S1 end-to-end. Grounded in the shape of a file-backed
//! streaming source connector, generalized from batch-reading a glob of
//! paths to registering a DataFusion table provider.

use std::collections::HashMap;

use async_trait::async_trait;
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::execution::context::SessionContext;
use datafusion::prelude::CsvReadOptions;
use serde_json::Value;
use sqlflow_core::errors::ConnectorError;

use crate::connector::{warn_on_unknown_fields, DestinationConnector, SourceConnector};

const KNOWN_FIELDS: &[&str] = &["path", "has_header", "delimiter", "encoding"];

#[derive(Default)]
pub struct CsvSourceConnector {
    path: String,
    has_header: bool,
    delimiter: u8,
}

impl CsvSourceConnector {
    pub fn new() -> Self {
        Self {
            path: String::new(),
            has_header: true,
            delimiter: b',',
        }
    }
}

#[async_trait]
impl SourceConnector for CsvSourceConnector {
    fn connector_type(&self) -> &'static str {
        "csv"
    }

    fn configure(&mut self, params: &HashMap<String, Value>) -> Result<(), ConnectorError> {
        warn_on_unknown_fields("csv", KNOWN_FIELDS, params);

        let path = params
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ConnectorError {
                step_id: "csv_source".to_string(),
                message: "csv source requires a 'path' parameter".to_string(),
                retryable: false,
            })?;
        self.path = path.to_string();

        if let Some(v) = params.get("has_header") {
            self.has_header = v.as_bool().unwrap_or(true);
        }
        if let Some(v) = params.get("delimiter") {
            if let Some(s) = v.as_str() {
                self.delimiter = s.as_bytes().first().copied().unwrap_or(b',');
            }
        }
        if let Some(encoding) = params.get("encoding").and_then(Value::as_str) {
            if !encoding.eq_ignore_ascii_case("utf-8") {
                tracing::warn!(encoding, "csv source: only utf-8 is read natively, other encodings pass through unconverted");
            }
        }

        Ok(())
    }

    async fn register(
        &self,
        ctx: &SessionContext,
        table_name: &str,
    ) -> Result<(), ConnectorError> {
        let options = CsvReadOptions::new()
            .has_header(self.has_header)
            .delimiter(self.delimiter);
        ctx.register_csv(table_name, &self.path, options)
            .await
            .map_err(|e| ConnectorError {
                step_id: table_name.to_string(),
                message: format!("failed to register csv source '{}': {e}", self.path),
                retryable: false,
            })
    }
}

#[derive(Default)]
pub struct CsvDestinationConnector {
    path: String,
    header: bool,
}

impl CsvDestinationConnector {
    pub fn new() -> Self {
        Self {
            path: String::new(),
            header: true,
        }
    }
}

#[async_trait]
impl DestinationConnector for CsvDestinationConnector {
    fn connector_type(&self) -> &'static str {
        "csv"
    }

    fn configure(
        &mut self,
        destination_uri: &str,
        options: &HashMap<String, Value>,
    ) -> Result<(), ConnectorError> {
        warn_on_unknown_fields("csv", &["header"], options);
        self.path = destination_uri.to_string();
        self.header = options.get("header").and_then(Value::as_bool).unwrap_or(true);
        Ok(())
    }

    async fn write(&self, ctx: &SessionContext, select_sql: &str) -> Result<(), ConnectorError> {
        if let Some(parent) = std::path::Path::new(&self.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ConnectorError {
                    step_id: self.path.clone(),
                    message: format!("failed to create output directory: {e}"),
                    retryable: false,
                })?;
            }
        }

        let df = ctx.sql(select_sql).await.map_err(|e| ConnectorError {
            step_id: self.path.clone(),
            message: format!("failed to plan export query: {e}"),
            retryable: false,
        })?;

        if !self.header {
            tracing::warn!(path = %self.path, "csv destination: header=false is not yet honored, writing with a header row");
        }

        df.write_csv(&self.path, DataFrameWriteOptions::new(), None)
            .await
            .map_err(|e| ConnectorError {
                step_id: self.path.clone(),
                message: format!("failed to write csv destination '{}': {e}", self.path),
                retryable: true,
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_requires_path() {
        let mut conn = CsvSourceConnector::new();
        let params = HashMap::new();
        assert!(conn.configure(&params).is_err());
    }

    #[test]
    fn configure_reads_header_flag() {
        let mut conn = CsvSourceConnector::new();
        let mut params = HashMap::new();
        params.insert("path".to_string(), Value::String("data.csv".into()));
        params.insert("has_header".to_string(), Value::Bool(false));
        conn.configure(&params).unwrap();
        assert!(!conn.has_header);
    }
}
