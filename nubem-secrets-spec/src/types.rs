use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Label attached to every tenant-created secret naming its owner.
pub const OWNER_LABEL: &str = "owner";

/// User-visible secret name, restricted to `[a-zA-Z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LogicalName(String);

impl LogicalName {
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if is_valid_name(&value) {
            Ok(Self(value))
        } else {
            Err(Error::InvalidName { name: value })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for LogicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LogicalName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_valid_name(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-'))
}

/// Backend secret id derived from an identity and a logical name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysicalKey(String);

impl PhysicalKey {
    /// Longest secret id the backend accepts.
    pub const MAX_LEN: usize = 255;

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key only uses characters and length the backend accepts.
    pub fn is_backend_safe(&self) -> bool {
        self.0.len() <= Self::MAX_LEN && is_valid_name(&self.0)
    }
}

impl fmt::Display for PhysicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Label map accepted by the backend.
///
/// Keys are 1-63 characters, start with a lowercase letter and use only
/// lowercase letters, digits, `_` and `-`. Values use the same characters and
/// may be empty. At most 64 labels per secret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretLabels(BTreeMap<String, String>);

impl SecretLabels {
    pub const MAX_LABELS: usize = 64;
    pub const MAX_LEN: usize = 63;

    pub fn parse(labels: BTreeMap<String, String>) -> Result<Self> {
        if labels.len() > Self::MAX_LABELS {
            let key = labels
                .keys()
                .nth(Self::MAX_LABELS)
                .cloned()
                .unwrap_or_default();
            return Err(Error::invalid_label(
                key,
                format!("a secret carries at most {} labels", Self::MAX_LABELS),
            ));
        }
        for (key, value) in &labels {
            if key.is_empty() || key.len() > Self::MAX_LEN {
                return Err(Error::invalid_label(key, "keys must be 1-63 characters"));
            }
            if !key.starts_with(|c: char| c.is_ascii_lowercase()) {
                return Err(Error::invalid_label(
                    key,
                    "keys must start with a lowercase letter",
                ));
            }
            if !key.chars().all(is_label_char) {
                return Err(Error::invalid_label(
                    key,
                    "keys may only contain lowercase letters, digits, `_` and `-`",
                ));
            }
            if value.len() > Self::MAX_LEN || !value.chars().all(is_label_char) {
                return Err(Error::invalid_label(
                    key,
                    "values must be at most 63 lowercase letters, digits, `_` or `-`",
                ));
            }
        }
        Ok(Self(labels))
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.0
    }
}

fn is_label_char(c: char) -> bool {
    matches!(c, 'a'..='z' | '0'..='9' | '_' | '-')
}

/// Secret payload. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(****)")
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle state of a single secret version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionState {
    Enabled,
    Disabled,
    Destroyed,
    #[serde(other)]
    Unknown,
}

impl VersionState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, VersionState::Enabled)
    }
}

/// One revision in a secret's append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretVersion {
    pub version: String,
    pub state: VersionState,
    pub create_time: Option<DateTime<Utc>>,
}

/// Per-user view of a stored secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretMetadata {
    pub name: String,
    pub create_time: Option<DateTime<Utc>>,
    pub latest_version: Option<String>,
    pub version_count: usize,
    pub labels: BTreeMap<String, String>,
    #[serde(skip)]
    pub physical_key: PhysicalKey,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn accepts_names_from_the_allowed_set() {
        for name in ["db-pass", "API_KEY", "a", "x-1_y-2"] {
            assert!(LogicalName::parse(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_names_outside_the_allowed_set() {
        for name in ["", "bad name!", "a.b", "user@host", "slash/name", "ünïcode"] {
            let err = LogicalName::parse(name).expect_err(name);
            assert_eq!(err.kind(), ErrorKind::InvalidName);
        }
    }

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn accepts_backend_compatible_labels() {
        let parsed = SecretLabels::parse(labels(&[
            ("env", "prod"),
            ("team-a_1", ""),
            ("owner", "alice_example_com"),
        ]))
        .unwrap();
        assert_eq!(parsed.as_map().len(), 3);
        assert!(SecretLabels::parse(BTreeMap::new()).is_ok());
    }

    #[test]
    fn rejects_labels_the_backend_refuses() {
        let long = "a".repeat(64);
        let cases = [
            labels(&[("Env Name", "prod")]),
            labels(&[("env", "Prod")]),
            labels(&[("1env", "prod")]),
            labels(&[("", "prod")]),
            labels(&[(long.as_str(), "x")]),
            labels(&[("env", long.as_str())]),
            labels(&[("env", "a.b")]),
        ];
        for case in cases {
            let err = SecretLabels::parse(case.clone()).expect_err(&format!("{case:?}"));
            assert_eq!(err.kind(), ErrorKind::InvalidLabel);
        }
    }

    #[test]
    fn label_count_is_capped() {
        let many: BTreeMap<String, String> =
            (0..65).map(|i| (format!("k{i}"), "v".to_string())).collect();
        let err = SecretLabels::parse(many).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLabel);
    }

    #[test]
    fn physical_key_length_limit() {
        assert!(PhysicalKey::new("a".repeat(255)).is_backend_safe());
        assert!(!PhysicalKey::new("a".repeat(256)).is_backend_safe());
        assert!(!PhysicalKey::new("a.b").is_backend_safe());
    }

    #[test]
    fn secret_value_debug_is_redacted() {
        let value = SecretValue::from("s3cr3t");
        assert_eq!(format!("{value:?}"), "SecretValue(****)");
        assert_eq!(value.expose(), "s3cr3t");
    }

    #[test]
    fn version_state_uses_backend_spelling() {
        let state: VersionState = serde_json::from_str("\"DISABLED\"").unwrap();
        assert_eq!(state, VersionState::Disabled);
        let state: VersionState = serde_json::from_str("\"STATE_UNSPECIFIED\"").unwrap();
        assert_eq!(state, VersionState::Unknown);
        assert_eq!(
            serde_json::to_string(&VersionState::Enabled).unwrap(),
            "\"ENABLED\""
        );
    }

    #[test]
    fn metadata_never_serializes_the_physical_key() {
        let meta = SecretMetadata {
            name: "db-pass".into(),
            create_time: None,
            latest_version: Some("1".into()),
            version_count: 1,
            labels: BTreeMap::new(),
            physical_key: PhysicalKey::new("alice-40example-2ecom_db-pass"),
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(!json.contains("alice"));
    }
}
