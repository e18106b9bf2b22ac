//! Explicit construction of connectors from a `connector_type` string. No
//! process-wide registry: each call site owns its connector instance and
//! configures it directly.

use sqlflow_core::errors::ConnectorError;

use crate::connector::{DestinationConnector, SourceConnector};
use crate::csv::{CsvDestinationConnector, CsvSourceConnector};
use crate::stubs::{
    GoogleSheetsDestinationConnector, GoogleSheetsSourceConnector, ParquetDestinationConnector,
    ParquetSourceConnector, PostgresDestinationConnector, PostgresSourceConnector,
    RestDestinationConnector, RestSourceConnector, S3DestinationConnector, S3SourceConnector,
    ShopifyDestinationConnector, ShopifySourceConnector,
};

pub fn build_source(connector_type: &str) -> Result<Box<dyn SourceConnector>, ConnectorError> {
    match connector_type {
        "csv" => Ok(Box::new(CsvSourceConnector::new())),
        "postgres" => Ok(Box::new(PostgresSourceConnector)),
        "s3" => Ok(Box::new(S3SourceConnector)),
        "rest" => Ok(Box::new(RestSourceConnector)),
        "parquet" => Ok(Box::new(ParquetSourceConnector)),
        "google_sheets" => Ok(Box::new(GoogleSheetsSourceConnector)),
        "shopify" => Ok(Box::new(ShopifySourceConnector)),
        other => Err(ConnectorError {
            step_id: connector_type.to_string(),
            message: format!("unknown source connector type '{other}'"),
            retryable: false,
        }),
    }
}

pub fn build_destination(connector_type: &str) -> Result<Box<dyn DestinationConnector>, ConnectorError> {
    match connector_type {
        "csv" => Ok(Box::new(CsvDestinationConnector::new())),
        "postgres" => Ok(Box::new(PostgresDestinationConnector)),
        "s3" => Ok(Box::new(S3DestinationConnector)),
        "rest" => Ok(Box::new(RestDestinationConnector)),
        "parquet" => Ok(Box::new(ParquetDestinationConnector)),
        "google_sheets" => Ok(Box::new(GoogleSheetsDestinationConnector)),
        "shopify" => Ok(Box::new(ShopifyDestinationConnector)),
        other => Err(ConnectorError {
            step_id: connector_type.to_string(),
            message: format!("unknown destination connector type '{other}'"),
            retryable: false,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_known_source_types() {
        for t in ["csv", "postgres", "s3", "rest", "parquet", "google_sheets", "shopify"] {
            assert!(build_source(t).is_ok(), "expected {t} to build");
        }
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(build_source("ftp").is_err());
        assert!(build_destination("ftp").is_err());
    }
}
