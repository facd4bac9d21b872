use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::types::VersionState;

/// Secret entry as reported by the backend listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSecret {
    /// Backend secret id (the last segment of `projects/{p}/secrets/{id}`).
    pub id: String,
    pub create_time: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
}

/// Version entry as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVersion {
    /// Version id (the last segment of `.../versions/{id}`).
    pub id: String,
    pub state: VersionState,
    pub create_time: Option<DateTime<Utc>>,
}

/// Which version an access call targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    Latest,
    Id(String),
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Latest => f.write_str("latest"),
            VersionSelector::Id(id) => f.write_str(id),
        }
    }
}

/// Flat, unscoped secret storage with native versioning.
///
/// Implementations address secrets by backend id only and know nothing about
/// tenants. Version listings are returned newest first; `page_size` bounds
/// the listing to the most recent entries.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn create_secret(
        &self,
        secret_id: &str,
        labels: &BTreeMap<String, String>,
    ) -> StoreResult<StoredSecret>;

    async fn add_secret_version(&self, secret_id: &str, payload: &[u8])
    -> StoreResult<StoredVersion>;

    async fn access_secret_version(
        &self,
        secret_id: &str,
        version: &VersionSelector,
    ) -> StoreResult<Vec<u8>>;

    /// Metadata of a single secret, without its versions.
    async fn get_secret(&self, secret_id: &str) -> StoreResult<StoredSecret>;

    async fn list_secrets(&self) -> StoreResult<Vec<StoredSecret>>;

    async fn list_secret_versions(
        &self,
        secret_id: &str,
        page_size: Option<u32>,
    ) -> StoreResult<Vec<StoredVersion>>;

    async fn delete_secret(&self, secret_id: &str) -> StoreResult<()>;
}

pub type DynSecretStore = Arc<dyn SecretStore>;

#[async_trait]
impl<T> SecretStore for Arc<T>
where
    T: SecretStore + ?Sized,
{
    async fn create_secret(
        &self,
        secret_id: &str,
        labels: &BTreeMap<String, String>,
    ) -> StoreResult<StoredSecret> {
        (**self).create_secret(secret_id, labels).await
    }

    async fn add_secret_version(
        &self,
        secret_id: &str,
        payload: &[u8],
    ) -> StoreResult<StoredVersion> {
        (**self).add_secret_version(secret_id, payload).await
    }

    async fn access_secret_version(
        &self,
        secret_id: &str,
        version: &VersionSelector,
    ) -> StoreResult<Vec<u8>> {
        (**self).access_secret_version(secret_id, version).await
    }

    async fn get_secret(&self, secret_id: &str) -> StoreResult<StoredSecret> {
        (**self).get_secret(secret_id).await
    }

    async fn list_secrets(&self) -> StoreResult<Vec<StoredSecret>> {
        (**self).list_secrets().await
    }

    async fn list_secret_versions(
        &self,
        secret_id: &str,
        page_size: Option<u32>,
    ) -> StoreResult<Vec<StoredVersion>> {
        (**self).list_secret_versions(secret_id, page_size).await
    }

    async fn delete_secret(&self, secret_id: &str) -> StoreResult<()> {
        (**self).delete_secret(secret_id).await
    }
}
