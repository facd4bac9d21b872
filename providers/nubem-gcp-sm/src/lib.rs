//! Google Secret Manager store backed by the REST v1 API.
//!
//! Secrets live flat under `projects/{project}/secrets/{id}`; this crate
//! knows nothing about tenants. Payloads are written as raw bytes, so values
//! stay readable from the console and from other Secret Manager clients.

pub mod auth;

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use nubem_secrets_spec::{
    SecretStore, StoreError, StoreResult, StoredSecret, StoredVersion, VersionSelector,
    VersionState,
};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::auth::TokenSource;

const SECRET_MANAGER_ENDPOINT: &str = "https://secretmanager.googleapis.com/v1";
const DEFAULT_PROJECT: &str = "nubemsecrets";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const LIST_PAGE_SIZE: u32 = 250;

/// Construct the store from environment configuration.
pub fn build_store() -> Result<GcpSecretStore> {
    let config = GcpProviderConfig::from_env()?;
    GcpSecretStore::new(config)
}

pub struct GcpProviderConfig {
    pub project: String,
    pub endpoint: String,
    pub timeout: Duration,
    pub token: TokenSource,
}

impl GcpProviderConfig {
    /// * `GCP_PROJECT_ID` (or `NUBEM_GCP_PROJECT`): project holding the secrets.
    /// * `NUBEM_GCP_ACCESS_TOKEN` / `GOOGLE_OAUTH_ACCESS_TOKEN`: static bearer
    ///   token. Without one, tokens come from the metadata server.
    /// * `NUBEM_GCP_SM_ENDPOINT`: API base URL override.
    /// * `NUBEM_GCP_HTTP_TIMEOUT_SECS`: request timeout (0 keeps the default).
    pub fn from_env() -> Result<Self> {
        let project = non_empty_var("NUBEM_GCP_PROJECT")
            .or_else(|| non_empty_var("GCP_PROJECT_ID"))
            .unwrap_or_else(|| DEFAULT_PROJECT.to_string());

        let token = match non_empty_var("NUBEM_GCP_ACCESS_TOKEN")
            .or_else(|| non_empty_var("GOOGLE_OAUTH_ACCESS_TOKEN"))
        {
            Some(token) => TokenSource::Static(token),
            None => TokenSource::metadata(),
        };

        let endpoint = non_empty_var("NUBEM_GCP_SM_ENDPOINT")
            .unwrap_or_else(|| SECRET_MANAGER_ENDPOINT.to_string());

        let timeout = env::var("NUBEM_GCP_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        Ok(Self {
            project,
            endpoint,
            timeout,
            token,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

pub struct GcpSecretStore {
    config: GcpProviderConfig,
    client: Client,
}

impl GcpSecretStore {
    pub fn new(config: GcpProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build reqwest client for Secret Manager")?;
        Ok(Self { config, client })
    }

    pub fn project(&self) -> &str {
        &self.config.project
    }

    fn project_url(&self) -> String {
        format!(
            "{}/projects/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.project
        )
    }

    fn secret_url(&self, secret_id: &str) -> String {
        format!("{}/secrets/{secret_id}", self.project_url())
    }

    async fn request(&self, method: Method, url: String) -> StoreResult<RequestBuilder> {
        let bearer = self
            .config
            .token
            .bearer(&self.client)
            .await
            .map_err(|err| StoreError::PermissionDenied(err.to_string()))?;
        Ok(self
            .client
            .request(method, url)
            .header("Authorization", bearer))
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, builder: RequestBuilder, resource: &str) -> StoreResult<String> {
        let response = builder
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(format!("http request failed: {err}")))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            Ok(body)
        } else {
            Err(classify(status, &body, resource))
        }
    }

    async fn list_versions_page(
        &self,
        secret_id: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> StoreResult<VersionListResponse> {
        let mut query = vec![("pageSize", page_size.to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        let builder = self
            .request(Method::GET, format!("{}/versions", self.secret_url(secret_id)))
            .await?
            .query(&query);
        let body = self.send(builder, secret_id).await?;
        parse_json(&body, "list secret versions")
    }
}

#[async_trait]
impl SecretStore for GcpSecretStore {
    async fn create_secret(
        &self,
        secret_id: &str,
        labels: &BTreeMap<String, String>,
    ) -> StoreResult<StoredSecret> {
        let body = json!({
            "replication": {"automatic": {}},
            "labels": labels,
        });
        let builder = self
            .request(Method::POST, format!("{}/secrets", self.project_url()))
            .await?
            .query(&[("secretId", secret_id)])
            .json(&body);
        let body = self.send(builder, secret_id).await?;
        let secret: SecretResource = parse_json(&body, "create secret")?;
        Ok(secret.into_stored())
    }

    async fn add_secret_version(
        &self,
        secret_id: &str,
        payload: &[u8],
    ) -> StoreResult<StoredVersion> {
        let body = json!({
            "payload": {"data": STANDARD.encode(payload)},
        });
        let builder = self
            .request(
                Method::POST,
                format!("{}:addVersion", self.secret_url(secret_id)),
            )
            .await?
            .json(&body);
        let body = self.send(builder, secret_id).await?;
        let version: VersionResource = parse_json(&body, "add secret version")?;
        Ok(version.into_stored())
    }

    async fn access_secret_version(
        &self,
        secret_id: &str,
        version: &VersionSelector,
    ) -> StoreResult<Vec<u8>> {
        let resource = format!("{secret_id}/versions/{version}");
        let builder = self
            .request(
                Method::GET,
                format!("{}/versions/{version}:access", self.secret_url(secret_id)),
            )
            .await?;
        let body = self.send(builder, &resource).await?;
        let parsed: AccessResponse = parse_json(&body, "access secret version")?;
        let data = parsed
            .payload
            .and_then(|payload| payload.data)
            .unwrap_or_default();
        STANDARD
            .decode(data)
            .map_err(|err| StoreError::Unavailable(format!("base64 decode failed: {err}")))
    }

    async fn get_secret(&self, secret_id: &str) -> StoreResult<StoredSecret> {
        let builder = self
            .request(Method::GET, self.secret_url(secret_id))
            .await?;
        let body = self.send(builder, secret_id).await?;
        let secret: SecretResource = parse_json(&body, "get secret")?;
        Ok(secret.into_stored())
    }

    async fn list_secrets(&self) -> StoreResult<Vec<StoredSecret>> {
        let mut collected = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("pageSize", LIST_PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }
            let builder = self
                .request(Method::GET, format!("{}/secrets", self.project_url()))
                .await?
                .query(&query);
            let body = self.send(builder, &self.config.project).await?;
            let page: SecretListResponse = parse_json(&body, "list secrets")?;
            collected.extend(page.secrets.into_iter().map(SecretResource::into_stored));

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        debug!(count = collected.len(), "listed backend secrets");
        Ok(collected)
    }

    async fn list_secret_versions(
        &self,
        secret_id: &str,
        page_size: Option<u32>,
    ) -> StoreResult<Vec<StoredVersion>> {
        if let Some(size) = page_size {
            let page = self.list_versions_page(secret_id, size, None).await?;
            return Ok(page
                .versions
                .into_iter()
                .take(size as usize)
                .map(VersionResource::into_stored)
                .collect());
        }

        let mut collected = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .list_versions_page(secret_id, LIST_PAGE_SIZE, page_token.as_deref())
                .await?;
            collected.extend(page.versions.into_iter().map(VersionResource::into_stored));
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(collected)
    }

    async fn delete_secret(&self, secret_id: &str) -> StoreResult<()> {
        let builder = self
            .request(Method::DELETE, self.secret_url(secret_id))
            .await?;
        self.send(builder, secret_id).await.map(|_| ())
    }
}

/// Map a failed Secret Manager response onto [`StoreError`].
///
/// The canonical `error.status` string wins over the HTTP code because
/// Secret Manager reports disabled versions as 400 `FAILED_PRECONDITION`.
fn classify(status: StatusCode, body: &str, resource: &str) -> StoreError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error);
    let canonical = detail.as_ref().and_then(|d| d.status.as_deref());
    let message = detail
        .as_ref()
        .and_then(|d| d.message.clone())
        .unwrap_or_else(|| format!("{status} {body}"));

    match (canonical, status) {
        (Some("NOT_FOUND"), _) | (None, StatusCode::NOT_FOUND) => StoreError::NotFound {
            resource: resource.to_string(),
        },
        (Some("ALREADY_EXISTS"), _) | (None, StatusCode::CONFLICT) => StoreError::AlreadyExists {
            resource: resource.to_string(),
        },
        (Some("FAILED_PRECONDITION"), _) | (None, StatusCode::PRECONDITION_FAILED) => {
            StoreError::FailedPrecondition(message)
        }
        (Some("INVALID_ARGUMENT"), _) | (None, StatusCode::BAD_REQUEST) => {
            StoreError::InvalidArgument(message)
        }
        (Some("PERMISSION_DENIED" | "UNAUTHENTICATED"), _)
        | (None, StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED) => {
            StoreError::PermissionDenied(message)
        }
        _ => StoreError::Unavailable(format!("{status}: {message}")),
    }
}

fn parse_json<T: for<'de> Deserialize<'de>>(body: &str, what: &str) -> StoreResult<T> {
    serde_json::from_str(body)
        .map_err(|err| StoreError::Unavailable(format!("failed to decode {what} response: {err}")))
}

fn last_segment(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).to_string()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretResource {
    name: String,
    #[serde(default)]
    create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

impl SecretResource {
    fn into_stored(self) -> StoredSecret {
        StoredSecret {
            id: last_segment(&self.name),
            create_time: self.create_time,
            labels: self.labels,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionResource {
    name: String,
    #[serde(default)]
    create_time: Option<DateTime<Utc>>,
    #[serde(default = "unknown_state")]
    state: VersionState,
}

fn unknown_state() -> VersionState {
    VersionState::Unknown
}

impl VersionResource {
    fn into_stored(self) -> StoredVersion {
        StoredVersion {
            id: last_segment(&self.name),
            state: self.state,
            create_time: self.create_time,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretListResponse {
    #[serde(default)]
    secrets: Vec<SecretResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionListResponse {
    #[serde(default)]
    versions: Vec<VersionResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct AccessResponse {
    payload: Option<Payload>,
}

#[derive(Deserialize)]
struct Payload {
    data: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: Option<String>,
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn google_error(code: u16, status: &str) -> String {
        json!({"error": {"code": code, "message": "boom", "status": status}}).to_string()
    }

    #[test]
    fn disabled_version_maps_to_failed_precondition() {
        let err = classify(
            StatusCode::BAD_REQUEST,
            &google_error(400, "FAILED_PRECONDITION"),
            "k/versions/latest",
        );
        assert_eq!(err, StoreError::FailedPrecondition("boom".into()));
    }

    #[test]
    fn canonical_statuses_map_to_store_errors() {
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, &google_error(404, "NOT_FOUND"), "k"),
            StoreError::NotFound { .. }
        ));
        assert!(matches!(
            classify(StatusCode::CONFLICT, &google_error(409, "ALREADY_EXISTS"), "k"),
            StoreError::AlreadyExists { .. }
        ));
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, &google_error(403, "PERMISSION_DENIED"), "k"),
            StoreError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, &google_error(400, "INVALID_ARGUMENT"), "k"),
            StoreError::InvalidArgument(_)
        ));
    }

    #[test]
    fn bare_status_codes_are_classified() {
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, "", "k"),
            StoreError::NotFound { .. }
        ));
        assert!(matches!(
            classify(StatusCode::SERVICE_UNAVAILABLE, "upstream down", "k"),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn version_listing_parses_wire_format() {
        let body = r#"{
            "versions": [
                {"name": "projects/p/secrets/k/versions/2", "createTime": "2024-05-01T10:00:00.123456Z", "state": "ENABLED"},
                {"name": "projects/p/secrets/k/versions/1", "createTime": "2024-04-01T10:00:00Z", "state": "DESTROYED"}
            ],
            "nextPageToken": "abc",
            "totalSize": 2
        }"#;
        let page: VersionListResponse = parse_json(body, "versions").unwrap();
        let versions: Vec<_> = page
            .versions
            .into_iter()
            .map(VersionResource::into_stored)
            .collect();
        assert_eq!(versions[0].id, "2");
        assert_eq!(versions[1].state, VersionState::Destroyed);
        assert!(versions[0].create_time > versions[1].create_time);
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
    }

    #[test]
    fn secret_listing_extracts_ids_and_labels() {
        let body = r#"{"secrets": [{
            "name": "projects/p/secrets/alice-40example-2ecom_db-pass",
            "createTime": "2024-05-01T10:00:00Z",
            "labels": {"owner": "alice_example_com"},
            "replication": {"automatic": {}}
        }]}"#;
        let page: SecretListResponse = parse_json(body, "secrets").unwrap();
        let stored = page
            .secrets
            .into_iter()
            .map(SecretResource::into_stored)
            .next()
            .unwrap();
        assert_eq!(stored.id, "alice-40example-2ecom_db-pass");
        assert_eq!(
            stored.labels.get("owner").map(String::as_str),
            Some("alice_example_com")
        );
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn empty_listing_is_not_an_error() {
        let page: SecretListResponse = parse_json("{}", "secrets").unwrap();
        assert!(page.secrets.is_empty());
    }
}
