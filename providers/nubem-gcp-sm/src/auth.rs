use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before the reported expiry.
const EXPIRY_SLACK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("metadata server rejected the token request: {status} {body}")]
    Unauthorized { status: StatusCode, body: String },
    #[error("failed to request token: {0}")]
    Request(String),
    #[error("failed to parse token response: {0}")]
    Parse(String),
}

/// Where bearer tokens for Secret Manager come from.
pub enum TokenSource {
    /// Fixed token from configuration.
    Static(String),
    /// Default service account of the GCE/Cloud Run metadata server.
    Metadata {
        url: String,
        cache: RwLock<Option<CachedToken>>,
    },
}

pub struct CachedToken {
    token: String,
    refresh_at: Instant,
}

impl TokenSource {
    pub fn metadata() -> Self {
        Self::metadata_at(METADATA_TOKEN_URL)
    }

    pub fn metadata_at(url: impl Into<String>) -> Self {
        TokenSource::Metadata {
            url: url.into(),
            cache: RwLock::new(None),
        }
    }

    pub async fn bearer(&self, client: &Client) -> Result<String, AuthError> {
        match self {
            TokenSource::Static(token) => Ok(format!("Bearer {token}")),
            TokenSource::Metadata { url, cache } => {
                if let Some(cached) = cache.read().await.as_ref() {
                    if Instant::now() < cached.refresh_at {
                        return Ok(format!("Bearer {}", cached.token));
                    }
                }

                let mut guard = cache.write().await;
                if let Some(cached) = guard.as_ref() {
                    if Instant::now() < cached.refresh_at {
                        return Ok(format!("Bearer {}", cached.token));
                    }
                }
                let fresh = request_metadata_token(client, url).await?;
                let bearer = format!("Bearer {}", fresh.token);
                *guard = Some(fresh);
                Ok(bearer)
            }
        }
    }
}

async fn request_metadata_token(client: &Client, url: &str) -> Result<CachedToken, AuthError> {
    let response = client
        .get(url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|err| AuthError::Request(err.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Unauthorized { status, body });
    }

    let body = response
        .text()
        .await
        .map_err(|err| AuthError::Request(err.to_string()))?;
    parse_token_response(&body, Instant::now())
}

fn parse_token_response(body: &str, now: Instant) -> Result<CachedToken, AuthError> {
    let payload: TokenResponse =
        serde_json::from_str(body).map_err(|err| AuthError::Parse(err.to_string()))?;
    let lifetime = Duration::from_secs(payload.expires_in.unwrap_or(3600));
    let refresh_in = lifetime
        .saturating_sub(EXPIRY_SLACK)
        .max(Duration::from_secs(1));

    Ok(CachedToken {
        token: payload.access_token,
        refresh_at: now + refresh_in,
    })
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_refreshes_before_expiry() {
        let now = Instant::now();
        let token = parse_token_response(
            r#"{"access_token":"ya29.abc","expires_in":3599,"token_type":"Bearer"}"#,
            now,
        )
        .unwrap();
        assert_eq!(token.token, "ya29.abc");
        assert_eq!(token.refresh_at, now + Duration::from_secs(3539));
    }

    #[test]
    fn short_lived_tokens_still_get_a_window() {
        let now = Instant::now();
        let token = parse_token_response(r#"{"access_token":"t","expires_in":5}"#, now).unwrap();
        assert_eq!(token.refresh_at, now + Duration::from_secs(1));
    }

    #[test]
    fn malformed_token_response_is_a_parse_error() {
        let err = parse_token_response("{}", Instant::now()).err().unwrap();
        assert!(matches!(err, AuthError::Parse(_)));
    }

    #[tokio::test]
    async fn static_tokens_are_used_verbatim() {
        let source = TokenSource::Static("abc".into());
        let bearer = source.bearer(&Client::new()).await.unwrap();
        assert_eq!(bearer, "Bearer abc");
    }
}
