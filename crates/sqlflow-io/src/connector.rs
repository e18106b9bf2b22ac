//! The connector interface consumed by the step executors (§6.4 / C5).
//!
//! A source connector's job is to make rows queryable by the analytic
//! engine, not to ferry rows through the crate itself — `register` hands
//! DataFusion a table provider (or view) under `table_name`, and C4's
//! generated SQL does the rest. A destination connector's job is the
//! mirror: run `select_sql` through the engine and land the result
//! somewhere external.

use std::collections::HashMap;

use async_trait::async_trait;
use datafusion::execution::context::SessionContext;
use serde_json::Value;
use sqlflow_core::errors::ConnectorError;

/// One configured read endpoint. `configure` validates `params` against the
/// connector's known-field set (unknown fields warn, don't fail) before any
/// query touches the engine.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    fn connector_type(&self) -> &'static str;

    fn configure(&mut self, params: &HashMap<String, Value>) -> Result<(), ConnectorError>;

    /// Register this source as a queryable table in `ctx` under
    /// `table_name`. Called once per `load` step before C4's materialization
    /// SQL runs against it.
    async fn register(
        &self,
        ctx: &SessionContext,
        table_name: &str,
    ) -> Result<(), ConnectorError>;
}

/// One configured write endpoint, identified by `connector_type` and
/// `destination_uri` on an `EXPORT` statement.
#[async_trait]
pub trait DestinationConnector: Send + Sync {
    fn connector_type(&self) -> &'static str;

    fn configure(
        &mut self,
        destination_uri: &str,
        options: &HashMap<String, Value>,
    ) -> Result<(), ConnectorError>;

    /// Run `select_sql` through `ctx` and write the result to this
    /// destination.
    async fn write(&self, ctx: &SessionContext, select_sql: &str) -> Result<(), ConnectorError>;
}

/// Fields a connector type recognizes; anything outside this set in a
/// profile or `PARAMS`/`OPTIONS` block produces a warning, not an error.
pub fn warn_on_unknown_fields(connector_type: &str, known: &[&str], params: &HashMap<String, Value>) {
    for key in params.keys() {
        if !known.contains(&key.as_str()) {
            tracing::warn!(
                connector_type,
                field = key.as_str(),
                "unrecognized field for this connector type"
            );
        }
    }
}
