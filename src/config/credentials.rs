use super::settings::Environment;
use crate::core::{Result, SyncError};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::Path;

/// Login for one target database.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCredentials {
    pub database_id: String,
    pub api_key: String,
    /// Service endpoint; the public one when absent.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl fmt::Debug for TargetCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetCredentials")
            .field("database_id", &self.database_id)
            .field("api_key", &"***")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Contents of `etapestry.config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub sandbox: TargetCredentials,
    pub production: TargetCredentials,
}

impl TargetConfig {
    pub fn credentials(&self, environment: Environment) -> &TargetCredentials {
        match environment {
            Environment::Sandbox => &self.sandbox,
            Environment::Production => &self.production,
        }
    }
}

/// API credentials of one source organization.
#[derive(Clone, Deserialize)]
pub struct OrganizationCredentials {
    #[serde(default)]
    pub label: String,
    pub key: String,
    pub license: String,
}

impl fmt::Debug for OrganizationCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrganizationCredentials")
            .field("label", &self.label)
            .field("key", &self.key)
            .field("license", &"***")
            .finish()
    }
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).map_err(|err| {
        SyncError::Config(format!("Failed to read '{}': {}", path.display(), err))
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|err| SyncError::Config(format!("Failed to parse '{}': {}", path.display(), err)))
}

pub fn load_target_config(path: &Path) -> Result<TargetConfig> {
    load_json(path)
}

/// Organizations from `raisedonors.config.json`.
///
/// Accepts a list of `{label, key, license}` (kept in file order) or an
/// object keyed by label (ordered by label). Unlabelled list entries are
/// labelled with their position.
pub fn load_organizations(path: &Path) -> Result<Vec<OrganizationCredentials>> {
    let raw: JsonValue = load_json(path)?;
    parse_organizations(raw)
}

fn parse_organizations(raw: JsonValue) -> Result<Vec<OrganizationCredentials>> {
    let mut orgs = Vec::new();
    match raw {
        JsonValue::Array(items) => {
            for (idx, item) in items.into_iter().enumerate() {
                let mut org: OrganizationCredentials = serde_json::from_value(item)?;
                if org.label.is_empty() {
                    org.label = idx.to_string();
                }
                orgs.push(org);
            }
        }
        JsonValue::Object(map) => {
            for (label, item) in map {
                let mut org: OrganizationCredentials = serde_json::from_value(item)?;
                org.label = label;
                orgs.push(org);
            }
        }
        other => {
            return Err(SyncError::Config(format!(
                "Organization config must be a list or an object, got {}",
                other
            )));
        }
    }

    if orgs.is_empty() {
        return Err(SyncError::Config("No organizations configured".to_string()));
    }
    Ok(orgs)
}
