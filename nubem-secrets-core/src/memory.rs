//! In-process [`SecretStore`] with Secret Manager semantics.
//!
//! Version ids are sequential per secret starting at 1, listings are newest
//! first, `latest` resolves to the newest version and fails when that
//! version is not enabled.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nubem_secrets_spec::{
    SecretStore, StoreError, StoreResult, StoredSecret, StoredVersion, VersionSelector,
    VersionState,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<BTreeMap<String, MemorySecret>>,
}

#[derive(Debug, Clone)]
struct MemorySecret {
    create_time: DateTime<Utc>,
    labels: BTreeMap<String, String>,
    versions: Vec<MemoryVersion>,
}

#[derive(Debug, Clone)]
struct MemoryVersion {
    id: u64,
    state: VersionState,
    create_time: DateTime<Utc>,
    payload: Vec<u8>,
}

impl MemorySecret {
    fn as_stored(&self, id: &str) -> StoredSecret {
        StoredSecret {
            id: id.to_string(),
            create_time: Some(self.create_time),
            labels: self.labels.clone(),
        }
    }
}

impl MemoryVersion {
    fn as_stored(&self) -> StoredVersion {
        StoredVersion {
            id: self.id.to_string(),
            state: self.state,
            create_time: Some(self.create_time),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the state of one version, as the backend console would.
    pub fn set_version_state(
        &self,
        secret_id: &str,
        version: &str,
        state: VersionState,
    ) -> StoreResult<()> {
        let mut guard = self.lock();
        let secret = guard
            .get_mut(secret_id)
            .ok_or_else(|| not_found(secret_id))?;
        let entry = secret
            .versions
            .iter_mut()
            .find(|entry| entry.id.to_string() == version)
            .ok_or_else(|| not_found(&format!("{secret_id}/versions/{version}")))?;
        entry.state = state;
        if state == VersionState::Destroyed {
            entry.payload.clear();
        }
        Ok(())
    }

    /// Backend ids currently stored, in listing order.
    pub fn secret_ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, MemorySecret>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn not_found(resource: &str) -> StoreError {
    StoreError::NotFound {
        resource: resource.to_string(),
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn create_secret(
        &self,
        secret_id: &str,
        labels: &BTreeMap<String, String>,
    ) -> StoreResult<StoredSecret> {
        let mut guard = self.lock();
        if guard.contains_key(secret_id) {
            return Err(StoreError::AlreadyExists {
                resource: secret_id.to_string(),
            });
        }
        let secret = MemorySecret {
            create_time: Utc::now(),
            labels: labels.clone(),
            versions: Vec::new(),
        };
        let stored = secret.as_stored(secret_id);
        guard.insert(secret_id.to_string(), secret);
        Ok(stored)
    }

    async fn add_secret_version(
        &self,
        secret_id: &str,
        payload: &[u8],
    ) -> StoreResult<StoredVersion> {
        let mut guard = self.lock();
        let secret = guard
            .get_mut(secret_id)
            .ok_or_else(|| not_found(secret_id))?;
        let next = secret.versions.last().map(|entry| entry.id + 1).unwrap_or(1);
        let entry = MemoryVersion {
            id: next,
            state: VersionState::Enabled,
            create_time: Utc::now(),
            payload: payload.to_vec(),
        };
        let stored = entry.as_stored();
        secret.versions.push(entry);
        Ok(stored)
    }

    async fn access_secret_version(
        &self,
        secret_id: &str,
        version: &VersionSelector,
    ) -> StoreResult<Vec<u8>> {
        let guard = self.lock();
        let secret = guard.get(secret_id).ok_or_else(|| not_found(secret_id))?;
        let entry = match version {
            VersionSelector::Latest => secret.versions.last(),
            VersionSelector::Id(id) => secret
                .versions
                .iter()
                .find(|entry| entry.id.to_string() == *id),
        }
        .ok_or_else(|| not_found(&format!("{secret_id}/versions/{version}")))?;

        if !entry.state.is_enabled() {
            return Err(StoreError::FailedPrecondition(format!(
                "{secret_id}/versions/{} is {:?}",
                entry.id, entry.state
            )));
        }
        Ok(entry.payload.clone())
    }

    async fn get_secret(&self, secret_id: &str) -> StoreResult<StoredSecret> {
        self.lock()
            .get(secret_id)
            .map(|secret| secret.as_stored(secret_id))
            .ok_or_else(|| not_found(secret_id))
    }

    async fn list_secrets(&self) -> StoreResult<Vec<StoredSecret>> {
        Ok(self
            .lock()
            .iter()
            .map(|(id, secret)| secret.as_stored(id))
            .collect())
    }

    async fn list_secret_versions(
        &self,
        secret_id: &str,
        page_size: Option<u32>,
    ) -> StoreResult<Vec<StoredVersion>> {
        let guard = self.lock();
        let secret = guard.get(secret_id).ok_or_else(|| not_found(secret_id))?;
        let limit = page_size.map(|size| size as usize).unwrap_or(usize::MAX);
        Ok(secret
            .versions
            .iter()
            .rev()
            .take(limit)
            .map(MemoryVersion::as_stored)
            .collect())
    }

    async fn delete_secret(&self, secret_id: &str) -> StoreResult<()> {
        self.lock()
            .remove(secret_id)
            .map(|_| ())
            .ok_or_else(|| not_found(secret_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn versions_are_sequential_and_listed_newest_first() {
        let store = MemoryStore::new();
        store.create_secret("k", &BTreeMap::new()).await.unwrap();
        store.add_secret_version("k", b"one").await.unwrap();
        store.add_secret_version("k", b"two").await.unwrap();

        let ids: Vec<_> = store
            .list_secret_versions("k", None)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(ids, vec!["2", "1"]);

        let latest = store.list_secret_versions("k", Some(1)).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, "2");
    }

    #[tokio::test]
    async fn get_secret_returns_labels() {
        let store = MemoryStore::new();
        let labels = BTreeMap::from([("owner".to_string(), "alice".to_string())]);
        store.create_secret("k", &labels).await.unwrap();
        assert_eq!(store.get_secret("k").await.unwrap().labels, labels);
        assert!(matches!(
            store.get_secret("missing").await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let store = MemoryStore::new();
        store.create_secret("k", &BTreeMap::new()).await.unwrap();
        let err = store.create_secret("k", &BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn latest_alias_fails_on_disabled_version() {
        let store = MemoryStore::new();
        store.create_secret("k", &BTreeMap::new()).await.unwrap();
        store.add_secret_version("k", b"one").await.unwrap();
        store.add_secret_version("k", b"two").await.unwrap();
        store
            .set_version_state("k", "2", VersionState::Disabled)
            .unwrap();

        let err = store
            .access_secret_version("k", &VersionSelector::Latest)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::FailedPrecondition(_)));

        let payload = store
            .access_secret_version("k", &VersionSelector::Id("1".into()))
            .await
            .unwrap();
        assert_eq!(payload, b"one");
    }

    #[tokio::test]
    async fn delete_removes_secret() {
        let store = MemoryStore::new();
        store.create_secret("k", &BTreeMap::new()).await.unwrap();
        store.delete_secret("k").await.unwrap();
        assert!(store.secret_ids().is_empty());
        let err = store.delete_secret("k").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
