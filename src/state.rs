//! Shared, read-only state handed to every handler and middleware.

use crate::{
    errors::ApiError,
    services::{storage_service::StorageService, token_service::TokenValidator},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// The storage service, or the reason it could not be built. A broken
    /// storage configuration only fails the endpoints that need storage.
    storage: Result<StorageService, Arc<str>>,
    pub validator: Arc<TokenValidator>,
    public_paths: Arc<[String]>,
}

impl AppState {
    pub fn new(
        storage: Result<StorageService, String>,
        validator: TokenValidator,
        public_paths: Vec<String>,
    ) -> Self {
        Self {
            storage: storage.map_err(Arc::from),
            validator: Arc::new(validator),
            public_paths: public_paths.into(),
        }
    }

    pub fn storage(&self) -> Result<&StorageService, ApiError> {
        self.storage
            .as_ref()
            .map_err(|reason| ApiError::ConfigurationError(reason.to_string()))
    }

    /// True when `path` falls under one of the unauthenticated prefixes.
    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}
