use std::env;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use axum::http::HeaderName;
use nubem_secrets_core::{DynSecretStore, KeyEncoding, MemoryStore};
use tracing::warn;

use crate::auth::DEFAULT_IDENTITY_HEADER;

const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub http_addr: SocketAddr,
    /// `gcp` or `memory`.
    pub backend: String,
    pub key_encoding: KeyEncoding,
    pub list_concurrency: Option<NonZeroUsize>,
    pub identity_header: HeaderName,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            backend: "gcp".into(),
            key_encoding: KeyEncoding::default(),
            list_concurrency: None,
            identity_header: HeaderName::from_static(DEFAULT_IDENTITY_HEADER),
        }
    }
}

impl BrokerConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(bind) = var("NUBEM_BIND_ADDRESS") {
            config.http_addr = parse_bind(&bind)?;
        }
        if let Some(backend) = var("SECRETS_BACKEND") {
            config.backend = backend.to_ascii_lowercase();
        }
        if let Some(encoding) = var("NUBEM_KEY_ENCODING") {
            config.key_encoding = encoding
                .parse()
                .map_err(|err: String| anyhow!(err))
                .context("invalid NUBEM_KEY_ENCODING")?;
        }
        if let Some(limit) = var("NUBEM_LIST_CONCURRENCY") {
            config.list_concurrency =
                parse_concurrency(&limit).context("invalid NUBEM_LIST_CONCURRENCY")?;
        }
        if let Some(header) = var("NUBEM_IDENTITY_HEADER") {
            config.identity_header = HeaderName::try_from(header.to_ascii_lowercase())
                .context("invalid NUBEM_IDENTITY_HEADER")?;
        }

        Ok(config)
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn parse_bind(value: &str) -> Result<SocketAddr> {
    value
        .parse()
        .with_context(|| format!("invalid bind address `{value}` (expected e.g. {DEFAULT_BIND})"))
}

/// `0` lifts the cap, matching an unset value.
pub fn parse_concurrency(value: &str) -> Result<Option<NonZeroUsize>> {
    let limit: usize = value
        .parse()
        .with_context(|| format!("`{value}` is not a number"))?;
    Ok(NonZeroUsize::new(limit))
}

pub async fn load_store(backend_kind: &str) -> Result<DynSecretStore> {
    match backend_kind {
        "memory" => memory_store(),
        "gcp" => {
            #[cfg(feature = "gcp-sm")]
            {
                gcp_store()
            }

            #[cfg(not(feature = "gcp-sm"))]
            {
                anyhow::bail!("gcp backend requested but gcp-sm feature is not enabled");
            }
        }
        other => Err(anyhow!("unsupported backend `{other}`")),
    }
}

fn memory_store() -> Result<DynSecretStore> {
    warn!("using in-memory secret store; contents are lost on restart");
    Ok(Arc::new(MemoryStore::new()))
}

#[cfg(feature = "gcp-sm")]
fn gcp_store() -> Result<DynSecretStore> {
    let store = nubem_gcp_sm::build_store().context("failed to initialize gcp secret store")?;
    tracing::info!(project = store.project(), "using google secret manager");
    Ok(Arc::new(store))
}
