//! HTTP broker for nubem-secrets.
//!
//! Identity comes from a header written by the authenticating proxy in front
//! of the service; every request is then served by [`SecretsService`] on
//! behalf of that caller.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod state;
pub mod telemetry;

use std::sync::Arc;

use anyhow::Context;
use nubem_secrets_core::{DynSecretStore, SecretsService};
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use config::BrokerConfig;
pub use state::AppState;
pub use telemetry::CorrelationId;

use crate::auth::IdentityHeader;

pub async fn run(config: BrokerConfig) -> anyhow::Result<()> {
    let state = build_state(&config).await?;

    let listener = TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind http listener on {}", config.http_addr))?;

    let http_addr = listener.local_addr()?;
    info!(%http_addr, backend = %config.backend, encoding = %config.key_encoding, "http server listening");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    info!("http server stopped");
    Ok(())
}

pub async fn build_state(config: &BrokerConfig) -> anyhow::Result<AppState> {
    let store = config::load_store(&config.backend).await?;
    Ok(build_state_with_store(store, config))
}

/// Assemble the state around an already constructed store.
pub fn build_state_with_store(store: DynSecretStore, config: &BrokerConfig) -> AppState {
    let service = SecretsService::builder(store)
        .key_encoding(config.key_encoding)
        .list_concurrency(config.list_concurrency)
        .build();
    AppState::new(
        Arc::new(service),
        Arc::new(IdentityHeader::new(config.identity_header.clone())),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(?err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => warn!(?err, "failed to install sigterm handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
