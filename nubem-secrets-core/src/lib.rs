//! Tenancy layer over a shared, flat secret store.
//!
//! [`SecretsService`] is the surface handed to transports. Every call takes
//! a [`Caller`]; user callers only ever see and touch secrets whose backend
//! ids carry their owner prefix, and secrets owned by someone else are
//! reported as not found.

pub mod audit;
pub mod directory;
mod errors;
pub mod memory;
pub mod namespace;
pub mod operations;

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

pub use audit::{AuditAction, AuditRecord, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use directory::SecretDirectory;
pub use memory::MemoryStore;
pub use namespace::{KeyEncoding, NamespaceMapper};
pub use nubem_secrets_spec::{
    Caller, DynSecretStore, Error, ErrorKind, Identity, Result, SecretMetadata, SecretStore,
    SecretValue, SecretVersion, VersionState,
};
pub use operations::SecretOperations;

/// Listing plus scoped operations sharing one store handle.
pub struct SecretsService {
    directory: SecretDirectory,
    operations: SecretOperations,
    mapper: NamespaceMapper,
}

impl SecretsService {
    pub fn builder(store: DynSecretStore) -> ServiceBuilder {
        ServiceBuilder::new(store)
    }

    pub fn mapper(&self) -> &NamespaceMapper {
        &self.mapper
    }

    pub async fn list(&self, caller: &Caller) -> Result<Vec<SecretMetadata>> {
        self.directory.list(caller).await
    }

    pub async fn get(&self, caller: &Caller, name: &str) -> Result<SecretValue> {
        self.operations.read(caller, name).await
    }

    pub async fn list_versions(&self, caller: &Caller, name: &str) -> Result<Vec<SecretVersion>> {
        self.operations.list_versions(caller, name).await
    }

    pub async fn create(
        &self,
        caller: &Caller,
        name: &str,
        value: &SecretValue,
        labels: BTreeMap<String, String>,
    ) -> Result<SecretVersion> {
        self.operations.create(caller, name, value, labels).await
    }

    pub async fn update(
        &self,
        caller: &Caller,
        name: &str,
        value: &SecretValue,
    ) -> Result<SecretVersion> {
        self.operations.update(caller, name, value).await
    }

    pub async fn delete(&self, caller: &Caller, name: &str) -> Result<()> {
        self.operations.delete(caller, name).await
    }
}

/// Builder for [`SecretsService`].
pub struct ServiceBuilder {
    store: DynSecretStore,
    encoding: KeyEncoding,
    list_concurrency: Option<NonZeroUsize>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl ServiceBuilder {
    pub fn new(store: DynSecretStore) -> Self {
        Self {
            store,
            encoding: KeyEncoding::default(),
            list_concurrency: None,
            audit: None,
        }
    }

    pub fn key_encoding(mut self, encoding: KeyEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Bound the enrichment fan-out of [`SecretsService::list`].
    pub fn list_concurrency(mut self, limit: Option<NonZeroUsize>) -> Self {
        self.list_concurrency = limit;
        self
    }

    /// Audit sink for mutations (default: [`TracingAuditSink`]).
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn build(self) -> SecretsService {
        let mapper = NamespaceMapper::new(self.encoding);
        let audit = self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink));
        SecretsService {
            directory: SecretDirectory::new(self.store.clone(), mapper)
                .with_concurrency(self.list_concurrency),
            operations: SecretOperations::new(self.store, mapper, audit),
            mapper,
        }
    }
}
