//! Tenant-scoped create/read/update/delete and version history.

use std::collections::BTreeMap;
use std::sync::Arc;

use nubem_secrets_spec::{
    Caller, DynSecretStore, Error, LogicalName, OWNER_LABEL, Operation, PhysicalKey, Result,
    SecretLabels, SecretValue, SecretVersion, StoreError, StoredVersion, VersionSelector,
};
use tracing::{debug, info, warn};

use crate::audit::{AuditAction, AuditRecord, AuditSink};
use crate::errors::store_failure;
use crate::namespace::{KeyEncoding, NamespaceMapper};

pub struct SecretOperations {
    store: DynSecretStore,
    mapper: NamespaceMapper,
    audit: Arc<dyn AuditSink>,
}

/// A logical name resolved against its caller.
struct Resolved {
    name: LogicalName,
    key: PhysicalKey,
}

impl SecretOperations {
    pub fn new(store: DynSecretStore, mapper: NamespaceMapper, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            mapper,
            audit,
        }
    }

    fn resolve(&self, caller: &Caller, name: &str) -> Result<Resolved> {
        let name = LogicalName::parse(name)?;
        let key = self.mapper.encode(caller, &name);
        if !key.is_backend_safe() {
            return Err(Error::invalid_name(name.into_string()));
        }
        Ok(Resolved { name, key })
    }

    /// Resolve a name that must already exist and belong to the caller.
    ///
    /// Legacy keys can nest (`a@b.co` prefixes every key of `a@b.co.uk`), so
    /// under that encoding the `owner` label is checked as well, matching
    /// what the directory shows. A disagreeing label reads as not found.
    async fn resolve_owned(
        &self,
        caller: &Caller,
        name: &str,
        operation: Operation,
    ) -> Result<Resolved> {
        let resolved = self.resolve(caller, name)?;
        let Caller::User(identity) = caller else {
            return Ok(resolved);
        };
        if self.mapper.encoding() != KeyEncoding::Legacy {
            return Ok(resolved);
        }

        let secret = self
            .store
            .get_secret(resolved.key.as_str())
            .await
            .map_err(|err| {
                store_failure(operation, caller, Some(resolved.name.as_str()), err)
            })?;
        let expected = self.mapper.owner_label(identity);
        match secret.labels.get(OWNER_LABEL) {
            Some(owner) if *owner != expected => {
                debug!(
                    secret = %resolved.key,
                    "prefix matches but owner label disagrees; treating as missing"
                );
                Err(Error::not_found(resolved.name.into_string()))
            }
            _ => Ok(resolved),
        }
    }

    /// Create a secret and write its first version.
    ///
    /// The `owner` label always reflects the caller, overriding any label of
    /// that name in `labels`.
    pub async fn create(
        &self,
        caller: &Caller,
        name: &str,
        value: &SecretValue,
        labels: BTreeMap<String, String>,
    ) -> Result<SecretVersion> {
        let Resolved { name, key } = self.resolve(caller, name)?;
        let mut labels = labels;
        if let Caller::User(identity) = caller {
            labels.insert(OWNER_LABEL.to_string(), self.mapper.owner_label(identity));
        }
        let labels = SecretLabels::parse(labels)?;

        self.store
            .create_secret(key.as_str(), labels.as_map())
            .await
            .map_err(|err| store_failure(Operation::Create, caller, Some(name.as_str()), err))?;

        let version = self
            .store
            .add_secret_version(key.as_str(), value.as_bytes())
            .await
            .map_err(|err| {
                warn!(
                    identity = caller.describe(),
                    name = %name,
                    "secret created without an initial version"
                );
                store_failure(Operation::Create, caller, Some(name.as_str()), err)
            })?;

        info!(identity = caller.describe(), name = %name, "created secret");
        self.audit
            .record(&AuditRecord::now(caller, AuditAction::Create, name.as_str()));
        Ok(to_version(version))
    }

    /// Value of the newest enabled version.
    pub async fn read(&self, caller: &Caller, name: &str) -> Result<SecretValue> {
        let Resolved { name, key } = self.resolve_owned(caller, name, Operation::Get).await?;
        let fail = |err| store_failure(Operation::Get, caller, Some(name.as_str()), err);

        let payload = match self
            .store
            .access_secret_version(key.as_str(), &VersionSelector::Latest)
            .await
        {
            Ok(payload) => payload,
            Err(StoreError::FailedPrecondition(_)) => {
                let versions = self
                    .store
                    .list_secret_versions(key.as_str(), None)
                    .await
                    .map_err(fail)?;
                let Some(enabled) = versions.into_iter().find(|v| v.state.is_enabled()) else {
                    return Err(Error::not_found(name.as_str()));
                };
                self.store
                    .access_secret_version(key.as_str(), &VersionSelector::Id(enabled.id))
                    .await
                    .map_err(fail)?
            }
            Err(err) => return Err(fail(err)),
        };

        let value = String::from_utf8(payload).map_err(|_| Error::BackendUnavailable {
            operation: Operation::Get,
            name: Some(name.to_string()),
            message: "secret payload is not valid utf-8".into(),
        })?;

        info!(identity = caller.describe(), name = %name, "read secret");
        Ok(SecretValue::new(value))
    }

    /// Append a new version; earlier versions are left untouched.
    pub async fn update(
        &self,
        caller: &Caller,
        name: &str,
        value: &SecretValue,
    ) -> Result<SecretVersion> {
        let Resolved { name, key } = self.resolve_owned(caller, name, Operation::Update).await?;
        let version = self
            .store
            .add_secret_version(key.as_str(), value.as_bytes())
            .await
            .map_err(|err| store_failure(Operation::Update, caller, Some(name.as_str()), err))?;

        info!(
            identity = caller.describe(),
            name = %name,
            version = %version.id,
            "updated secret"
        );
        self.audit
            .record(&AuditRecord::now(caller, AuditAction::Update, name.as_str()));
        Ok(to_version(version))
    }

    /// Full version history, oldest first.
    pub async fn list_versions(&self, caller: &Caller, name: &str) -> Result<Vec<SecretVersion>> {
        let Resolved { name, key } = self
            .resolve_owned(caller, name, Operation::ListVersions)
            .await?;
        let mut versions: Vec<SecretVersion> = self
            .store
            .list_secret_versions(key.as_str(), None)
            .await
            .map_err(|err| {
                store_failure(Operation::ListVersions, caller, Some(name.as_str()), err)
            })?
            .into_iter()
            .rev()
            .map(to_version)
            .collect();
        // Stable, so equal timestamps keep the reversed backend order.
        versions.sort_by(|a, b| a.create_time.cmp(&b.create_time));

        info!(
            identity = caller.describe(),
            name = %name,
            count = versions.len(),
            "listed secret versions"
        );
        Ok(versions)
    }

    /// Irreversibly delete the secret and every version.
    pub async fn delete(&self, caller: &Caller, name: &str) -> Result<()> {
        let Resolved { name, key } = self.resolve_owned(caller, name, Operation::Delete).await?;
        self.store
            .delete_secret(key.as_str())
            .await
            .map_err(|err| store_failure(Operation::Delete, caller, Some(name.as_str()), err))?;

        info!(identity = caller.describe(), name = %name, "deleted secret");
        self.audit
            .record(&AuditRecord::now(caller, AuditAction::Delete, name.as_str()));
        Ok(())
    }
}

fn to_version(stored: StoredVersion) -> SecretVersion {
    SecretVersion {
        version: stored.id,
        state: stored.state,
        create_time: stored.create_time,
    }
}
