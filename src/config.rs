use crate::model::{Category, EntityDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Brokers to register at startup.
///
/// ```json
/// {
///   "brokers": [
///     { "id": "0b6c...", "category": "INBOUND",
///       "definition": { "type": "FOLDER", "properties": { "rootFolder": "/data" } } }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvesterConfig {
    #[serde(default)]
    pub brokers: Vec<BrokerEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerEntry {
    /// Fixed identifier; a random one is assigned when absent
    #[serde(default)]
    pub id: Option<Uuid>,
    pub category: Category,
    pub definition: EntityDefinition,
}

impl HarvesterConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }
}
