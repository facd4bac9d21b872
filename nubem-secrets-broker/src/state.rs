use std::sync::Arc;

use nubem_secrets_core::SecretsService;

use crate::auth::IdentityHeader;

pub type SharedService = Arc<SecretsService>;

#[derive(Clone)]
pub struct AppState {
    pub service: SharedService,
    pub identity: Arc<IdentityHeader>,
}

impl AppState {
    pub fn new(service: SharedService, identity: Arc<IdentityHeader>) -> Self {
        Self { service, identity }
    }
}
