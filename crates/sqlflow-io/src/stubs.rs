//! Connector stubs for transports not implemented in this build. `configure`
//! validates known fields so profile/param mistakes surface at plan time;
//! `register`/`write` always fail with `ConnectorError::not_implemented`,
//! matching spec.md's framing of these as "specified only by the interface
//! the core consumes."

use std::collections::HashMap;

use async_trait::async_trait;
use datafusion::execution::context::SessionContext;
use serde_json::Value;
use sqlflow_core::errors::ConnectorError;

use crate::connector::{warn_on_unknown_fields, DestinationConnector, SourceConnector};

macro_rules! stub_source {
    ($name:ident, $type_name:literal, $known:expr) => {
        #[derive(Default)]
        pub struct $name;

        #[async_trait]
        impl SourceConnector for $name {
            fn connector_type(&self) -> &'static str {
                $type_name
            }

            fn configure(&mut self, params: &HashMap<String, Value>) -> Result<(), ConnectorError> {
                warn_on_unknown_fields($type_name, $known, params);
                Ok(())
            }

            async fn register(
                &self,
                _ctx: &SessionContext,
                _table_name: &str,
            ) -> Result<(), ConnectorError> {
                Err(ConnectorError::not_implemented($type_name))
            }
        }
    };
}

macro_rules! stub_destination {
    ($name:ident, $type_name:literal, $known:expr) => {
        #[derive(Default)]
        pub struct $name;

        #[async_trait]
        impl DestinationConnector for $name {
            fn connector_type(&self) -> &'static str {
                $type_name
            }

            fn configure(
                &mut self,
                _destination_uri: &str,
                options: &HashMap<String, Value>,
            ) -> Result<(), ConnectorError> {
                warn_on_unknown_fields($type_name, $known, options);
                Ok(())
            }

            async fn write(&self, _ctx: &SessionContext, _select_sql: &str) -> Result<(), ConnectorError> {
                Err(ConnectorError::not_implemented($type_name))
            }
        }
    };
}

stub_source!(
    PostgresSourceConnector,
    "postgres",
    &["host", "port", "database", "schema", "user", "password", "sslmode", "connect_timeout"]
);
stub_destination!(
    PostgresDestinationConnector,
    "postgres",
    &["host", "port", "database", "schema", "user", "password", "sslmode", "connect_timeout"]
);

stub_source!(
    S3SourceConnector,
    "s3",
    &["bucket", "key", "region", "endpoint_url"]
);
stub_destination!(
    S3DestinationConnector,
    "s3",
    &["bucket", "key", "region", "endpoint_url"]
);

stub_source!(
    RestSourceConnector,
    "rest",
    &["url", "method", "headers", "timeout"]
);
stub_destination!(
    RestDestinationConnector,
    "rest",
    &["url", "method", "headers", "timeout"]
);

stub_source!(ParquetSourceConnector, "parquet", &["path"]);
stub_destination!(ParquetDestinationConnector, "parquet", &["path"]);

stub_source!(
    GoogleSheetsSourceConnector,
    "google_sheets",
    &["spreadsheet_id", "sheet_name", "credentials_path"]
);
stub_destination!(
    GoogleSheetsDestinationConnector,
    "google_sheets",
    &["spreadsheet_id", "sheet_name", "credentials_path"]
);

stub_source!(
    ShopifySourceConnector,
    "shopify",
    &["shop", "access_token", "api_version"]
);
stub_destination!(
    ShopifyDestinationConnector,
    "shopify",
    &["shop", "access_token", "api_version"]
);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn postgres_source_reports_not_implemented() {
        let mut conn = PostgresSourceConnector;
        conn.configure(&HashMap::new()).unwrap();
        let ctx = SessionContext::new();
        let err = conn.register(&ctx, "t").await.unwrap_err();
        assert!(!err.retryable);
    }
}
