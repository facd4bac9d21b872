use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nubem_secrets_core::{MemoryAuditSink, MemoryStore, SecretsService};
use nubem_secrets_spec::{
    SecretStore, StoreError, StoreResult, StoredSecret, StoredVersion, VersionSelector,
};

/// Wraps [`MemoryStore`], counting calls and injecting delays or failures.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    calls: AtomicUsize,
    backend_failure: Mutex<Option<StoreError>>,
    version_failures: Mutex<Vec<String>>,
    version_delays: Mutex<HashMap<String, Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[allow(dead_code)]
impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Make every subsequent call fail with `err`.
    pub fn fail_backend(&self, err: StoreError) {
        *self.backend_failure.lock().unwrap() = Some(err);
    }

    pub fn fail_versions_for(&self, secret_id: &str) {
        self.version_failures
            .lock()
            .unwrap()
            .push(secret_id.to_string());
    }

    pub fn delay_versions_for(&self, secret_id: &str, delay: Duration) {
        self.version_delays
            .lock()
            .unwrap()
            .insert(secret_id.to_string(), delay);
    }

    fn tick(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.backend_failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SecretStore for RecordingStore {
    async fn create_secret(
        &self,
        secret_id: &str,
        labels: &BTreeMap<String, String>,
    ) -> StoreResult<StoredSecret> {
        self.tick()?;
        self.inner.create_secret(secret_id, labels).await
    }

    async fn add_secret_version(
        &self,
        secret_id: &str,
        payload: &[u8],
    ) -> StoreResult<StoredVersion> {
        self.tick()?;
        self.inner.add_secret_version(secret_id, payload).await
    }

    async fn access_secret_version(
        &self,
        secret_id: &str,
        version: &VersionSelector,
    ) -> StoreResult<Vec<u8>> {
        self.tick()?;
        self.inner.access_secret_version(secret_id, version).await
    }

    async fn get_secret(&self, secret_id: &str) -> StoreResult<StoredSecret> {
        self.tick()?;
        self.inner.get_secret(secret_id).await
    }

    async fn list_secrets(&self) -> StoreResult<Vec<StoredSecret>> {
        self.tick()?;
        self.inner.list_secrets().await
    }

    async fn list_secret_versions(
        &self,
        secret_id: &str,
        page_size: Option<u32>,
    ) -> StoreResult<Vec<StoredVersion>> {
        self.tick()?;
        if self
            .version_failures
            .lock()
            .unwrap()
            .iter()
            .any(|id| id == secret_id)
        {
            return Err(StoreError::Unavailable("injected failure".into()));
        }

        let delay = self.version_delays.lock().unwrap().get(secret_id).copied();
        let unbounded = page_size.is_none();
        if unbounded {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if unbounded {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        self.inner.list_secret_versions(secret_id, page_size).await
    }

    async fn delete_secret(&self, secret_id: &str) -> StoreResult<()> {
        self.tick()?;
        self.inner.delete_secret(secret_id).await
    }
}

#[allow(dead_code)]
pub fn service(store: Arc<RecordingStore>) -> (SecretsService, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let service = SecretsService::builder(store)
        .audit_sink(audit.clone())
        .build();
    (service, audit)
}
