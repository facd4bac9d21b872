use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::Utc;
use nubem_secrets_core::Caller;
use tracing::{Instrument, info};

use crate::auth;
use crate::error::{AppError, attach_correlation};
use crate::models::{
    CreateSecretRequest, HealthResponse, MessageResponse, SecretListItem, SecretValueResponse,
    UpdateSecretRequest, VersionInfo,
};
use crate::state::AppState;
use crate::telemetry::{CorrelationId, correlation_layer, request_span};

pub fn router(state: AppState) -> Router {
    let api = api_routes().layer(middleware::from_fn_with_state(
        state.clone(),
        auth::http_layer,
    ));

    Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .layer(middleware::from_fn(correlation_layer))
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/secrets", get(list_secrets).post(create_secret))
        .route(
            "/api/secrets/{name}",
            get(get_secret).put(update_secret).delete(delete_secret),
        )
        .route("/api/secrets/{name}/versions", get(list_versions))
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
        timestamp: Utc::now(),
    })
}

async fn list_secrets(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.list", &correlation.0);
    async move {
        let secrets = state.service.list(&caller).await?;
        let items: Vec<SecretListItem> = secrets.into_iter().map(Into::into).collect();
        Ok(Json(items))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}

async fn get_secret(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(caller): Extension<Caller>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.get", &correlation.0);
    async move {
        let value = state.service.get(&caller, &name).await?;
        info!(identity = caller.describe(), name = %name, "secret accessed");
        Ok(Json(SecretValueResponse {
            name,
            value: value.into_string(),
        }))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}

async fn list_versions(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(caller): Extension<Caller>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.versions", &correlation.0);
    async move {
        let versions = state.service.list_versions(&caller, &name).await?;
        let versions: Vec<VersionInfo> = versions.into_iter().map(Into::into).collect();
        Ok(Json(versions))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}

async fn create_secret(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(caller): Extension<Caller>,
    request: Result<Json<CreateSecretRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.create", &correlation.0);
    async move {
        let Json(request) = request?;
        let (name, value, labels) = request.into_parts()?;
        state.service.create(&caller, &name, &value, labels).await?;
        Ok((
            StatusCode::CREATED,
            Json(MessageResponse::new("Secret created successfully", name)),
        ))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}

async fn update_secret(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(caller): Extension<Caller>,
    Path(name): Path<String>,
    request: Result<Json<UpdateSecretRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.update", &correlation.0);
    async move {
        let Json(request) = request?;
        let value = request.into_value()?;
        state.service.update(&caller, &name, &value).await?;
        Ok(Json(MessageResponse::new("Secret updated successfully", name)))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}

async fn delete_secret(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(caller): Extension<Caller>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.delete", &correlation.0);
    async move {
        state.service.delete(&caller, &name).await?;
        Ok(Json(MessageResponse::new("Secret deleted successfully", name)))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}
