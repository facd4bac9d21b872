use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use nubem_secrets_core::Caller;
use tracing::debug;

use crate::error::AppError;
use crate::state::AppState;
use crate::telemetry::CorrelationId;

/// Header set by Google Identity-Aware Proxy in front of the service.
pub const DEFAULT_IDENTITY_HEADER: &str = "x-goog-authenticated-user-email";

const IAP_ACCOUNT_PREFIX: &str = "accounts.google.com:";

/// Reads the verified caller email from a header written by the trusted
/// proxy in front of the broker. The broker performs no authentication of
/// its own; the header must not be reachable by clients directly.
#[derive(Clone, Debug)]
pub struct IdentityHeader {
    name: HeaderName,
}

impl IdentityHeader {
    pub fn new(name: HeaderName) -> Self {
        Self { name }
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.name
    }

    pub fn caller(&self, headers: &HeaderMap) -> Option<Caller> {
        let raw = headers.get(&self.name)?.to_str().ok()?.trim();
        let email = raw.strip_prefix(IAP_ACCOUNT_PREFIX).unwrap_or(raw).trim();
        if email.is_empty() {
            return None;
        }
        Some(Caller::user(email))
    }
}

impl Default for IdentityHeader {
    fn default() -> Self {
        Self::new(HeaderName::from_static(DEFAULT_IDENTITY_HEADER))
    }
}

pub async fn http_layer(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match state.identity.caller(req.headers()) {
        Some(caller) => {
            req.extensions_mut().insert(caller);
            next.run(req).await
        }
        None => {
            debug!(header = %state.identity.header_name(), "request without identity");
            let err = AppError::unauthorized("missing identity header");
            match req.extensions().get::<CorrelationId>() {
                Some(correlation) => err.with_correlation(correlation.0.clone()),
                None => err,
            }
            .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(DEFAULT_IDENTITY_HEADER, HeaderValue::from_str(value).unwrap());
        map
    }

    #[test]
    fn strips_the_iap_account_prefix() {
        let caller = IdentityHeader::default()
            .caller(&headers("accounts.google.com:alice@example.com"))
            .unwrap();
        assert_eq!(caller, Caller::user("alice@example.com"));
    }

    #[test]
    fn plain_email_is_accepted() {
        let caller = IdentityHeader::default()
            .caller(&headers("bob@example.com"))
            .unwrap();
        assert_eq!(caller.describe(), "bob@example.com");
    }

    #[test]
    fn empty_or_missing_header_yields_no_caller() {
        let identity = IdentityHeader::default();
        assert!(identity.caller(&HeaderMap::new()).is_none());
        assert!(identity.caller(&headers("  ")).is_none());
        assert!(identity.caller(&headers("accounts.google.com:")).is_none());
    }

    #[test]
    fn custom_header_name_is_honoured() {
        let identity = IdentityHeader::new(HeaderName::from_static("x-user-email"));
        let mut map = HeaderMap::new();
        map.insert("x-user-email", HeaderValue::from_static("carol@example.com"));
        assert_eq!(identity.caller(&map), Some(Caller::user("carol@example.com")));
        assert!(identity.caller(&headers("alice@example.com")).is_none());
    }
}
