//! The `profile.yml` schema (§6.2): named connector configurations and engine
//! settings a pipeline run is executed against. Deserialized with `serde_yaml`
//! and checked with `validator` before anything downstream trusts it.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use crate::connector::warn_on_unknown_fields;

const CURRENT_VERSION: &str = "1.0";

#[derive(Debug, Deserialize)]
pub struct Profile {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub variables: HashMap<String, Value>,

    #[serde(default)]
    pub connectors: HashMap<String, ConnectorProfile>,

    #[serde(default)]
    pub engines: HashMap<String, EngineProfile>,
}

fn default_version() -> String {
    CURRENT_VERSION.to_string()
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConnectorProfile {
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "connector profile is missing a 'type'"))]
    pub connector_type: String,

    #[serde(default)]
    pub params: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct EngineProfile {
    #[serde(default)]
    pub settings: HashMap<String, Value>,
}

/// Known profile fields per connector type, the same lists the stub and csv
/// connectors validate their own `PARAMS`/`OPTIONS` against.
fn known_fields(connector_type: &str) -> &'static [&'static str] {
    match connector_type {
        "csv" => &["path", "has_header", "delimiter", "encoding"],
        "postgres" => &["host", "port", "database", "schema", "user", "password", "sslmode", "connect_timeout"],
        "s3" => &["bucket", "key", "region", "endpoint_url"],
        "rest" => &["url", "method", "headers", "timeout"],
        "parquet" => &["path"],
        "google_sheets" => &["spreadsheet_id", "sheet_name", "credentials_path"],
        "shopify" => &["shop", "access_token", "api_version"],
        _ => &[],
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("failed to parse profile: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("profile is invalid: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl Profile {
    pub fn parse(yaml: &str) -> Result<Self, ProfileError> {
        let profile: Profile = serde_yaml::from_str(yaml)?;
        for connector in profile.connectors.values() {
            connector.validate()?;
        }

        if profile.version != CURRENT_VERSION {
            tracing::warn!(
                version = profile.version.as_str(),
                current = CURRENT_VERSION,
                "profile declares an unrecognized version, proceeding as best-effort"
            );
        }

        for (name, connector) in &profile.connectors {
            let known = known_fields(&connector.connector_type);
            if !known.is_empty() {
                warn_on_unknown_fields(&connector.connector_type, known, &connector.params);
            } else {
                tracing::warn!(connector = name.as_str(), connector_type = connector.connector_type.as_str(), "unrecognized connector type");
            }
        }

        Ok(profile)
    }

    pub fn connector_vars(&self, name: &str) -> Option<&HashMap<String, Value>> {
        self.connectors.get(name).map(|c| &c.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_profile() {
        let yaml = r#"
version: "1.0"
variables:
  env: "dev"
connectors:
  customers:
    type: csv
    params:
      path: "data/customers.csv"
"#;
        let profile = Profile::parse(yaml).unwrap();
        assert_eq!(profile.variables.get("env").unwrap(), "dev");
        assert_eq!(profile.connectors["customers"].connector_type, "csv");
    }

    #[test]
    fn missing_connector_type_is_rejected() {
        let yaml = r#"
connectors:
  broken:
    params: {}
"#;
        assert!(Profile::parse(yaml).is_err());
    }

    #[test]
    fn defaults_version_when_absent() {
        let yaml = "connectors: {}\n";
        let profile = Profile::parse(yaml).unwrap();
        assert_eq!(profile.version, "1.0");
    }
}
