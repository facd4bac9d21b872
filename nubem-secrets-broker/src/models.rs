use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use nubem_secrets_core::{SecretMetadata, SecretValue, SecretVersion, VersionState};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSecretRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl CreateSecretRequest {
    pub fn into_parts(self) -> Result<(String, SecretValue, BTreeMap<String, String>), AppError> {
        let value = non_empty_value(self.value)?;
        Ok((self.name, value, self.labels))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSecretRequest {
    #[serde(default)]
    pub value: String,
}

impl UpdateSecretRequest {
    pub fn into_value(self) -> Result<SecretValue, AppError> {
        non_empty_value(self.value)
    }
}

fn non_empty_value(value: String) -> Result<SecretValue, AppError> {
    if value.is_empty() {
        return Err(AppError::bad_request("\"value\" is not allowed to be empty"));
    }
    Ok(SecretValue::new(value))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    pub name: String,
}

impl MessageResponse {
    pub fn new(message: &str, name: String) -> Self {
        Self {
            message: message.to_string(),
            name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretValueResponse {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretListItem {
    pub name: String,
    pub create_time: Option<DateTime<Utc>>,
    pub latest_version: Option<String>,
    pub version_count: usize,
    pub labels: BTreeMap<String, String>,
}

impl From<SecretMetadata> for SecretListItem {
    fn from(meta: SecretMetadata) -> Self {
        Self {
            name: meta.name,
            create_time: meta.create_time,
            latest_version: meta.latest_version,
            version_count: meta.version_count,
            labels: meta.labels,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: String,
    pub state: VersionState,
    pub create_time: Option<DateTime<Utc>>,
}

impl From<SecretVersion> for VersionInfo {
    fn from(version: SecretVersion) -> Self {
        Self {
            version: version.version,
            state: version.state,
            create_time: version.create_time,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}
