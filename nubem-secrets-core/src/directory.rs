//! Per-user listings built from the backend's flat secret listing.

use std::num::NonZeroUsize;

use futures::stream::{self, StreamExt, TryStreamExt};
use nubem_secrets_spec::{
    Caller, DynSecretStore, Error, Operation, OWNER_LABEL, PhysicalKey, Result, SecretMetadata,
    StoreError, StoredSecret,
};
use tracing::{debug, info, warn};

use crate::errors::store_failure;
use crate::namespace::NamespaceMapper;

pub struct SecretDirectory {
    store: DynSecretStore,
    mapper: NamespaceMapper,
    concurrency: Option<NonZeroUsize>,
}

impl SecretDirectory {
    pub fn new(store: DynSecretStore, mapper: NamespaceMapper) -> Self {
        Self {
            store,
            mapper,
            concurrency: None,
        }
    }

    /// Cap the number of secrets enriched at once. Without a cap every
    /// retained secret is enriched concurrently.
    pub fn with_concurrency(mut self, limit: Option<NonZeroUsize>) -> Self {
        self.concurrency = limit;
        self
    }

    /// Secrets visible to `caller`, in backend listing order.
    ///
    /// Each retained secret costs two extra version listings. Any failure
    /// there fails the whole call; no partial listing is returned.
    pub async fn list(&self, caller: &Caller) -> Result<Vec<SecretMetadata>> {
        let secrets = self
            .store
            .list_secrets()
            .await
            .map_err(|err| store_failure(Operation::List, caller, None, err))?;
        let total = secrets.len();

        let owned: Vec<(String, StoredSecret)> = secrets
            .into_iter()
            .filter_map(|secret| {
                let name = self.owned_name(caller, &secret)?;
                Some((name, secret))
            })
            .collect();

        let limit = self
            .concurrency
            .map(NonZeroUsize::get)
            .unwrap_or(owned.len())
            .max(1);

        let views: Vec<SecretMetadata> = stream::iter(owned)
            .map(|(name, secret)| self.enrich(name, secret))
            .buffered(limit)
            .try_collect()
            .await?;

        info!(
            identity = caller.describe(),
            scanned = total,
            returned = views.len(),
            "listed secrets"
        );
        Ok(views)
    }

    fn owned_name(&self, caller: &Caller, secret: &StoredSecret) -> Option<String> {
        let name = self.mapper.decode(&secret.id, caller)?;
        if let Caller::User(identity) = caller {
            let expected = self.mapper.owner_label(identity);
            if let Some(label) = secret.labels.get(OWNER_LABEL) {
                if *label != expected {
                    debug!(
                        secret = %secret.id,
                        "prefix matches but owner label disagrees; skipping"
                    );
                    return None;
                }
            }
        }
        Some(name.to_string())
    }

    async fn enrich(&self, name: String, secret: StoredSecret) -> Result<SecretMetadata> {
        let enrichment_error = |err: StoreError| {
            warn!(secret = %secret.id, name = %name, error = %err, "version lookup failed");
            Error::DirectoryEnrichment {
                name: name.clone(),
                message: err.to_string(),
            }
        };

        let (latest, all) = futures::try_join!(
            self.store.list_secret_versions(&secret.id, Some(1)),
            self.store.list_secret_versions(&secret.id, None),
        )
        .map_err(enrichment_error)?;

        Ok(SecretMetadata {
            latest_version: latest.into_iter().next().map(|version| version.id),
            version_count: all.len(),
            create_time: secret.create_time,
            labels: secret.labels,
            physical_key: PhysicalKey::new(secret.id),
            name,
        })
    }
}
