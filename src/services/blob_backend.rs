//! src/services/blob_backend.rs
//!
//! The seam between the storage service and whatever actually holds the
//! bytes. Production uses an Azure Blob Storage container through
//! `object_store`; development can point at a local directory, and tests use
//! the in-memory store or hand-written fakes.

use crate::config::{BackendKind, StorageConfig};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use object_store::{
    Attribute, Attributes, GetOptions, ObjectMeta, ObjectStore, PutOptions, PutPayload,
    azure::{AzureCredentialProvider, MicrosoftAzureBuilder},
    local::LocalFileSystem,
    path::Path,
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::{fs, io, sync::Arc};
use thiserror::Error;
use tracing::debug;

/// Bytes left as-is in a URL path segment (RFC 3986 unreserved).
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Concurrent attribute lookups per listing.
const ATTRIBUTE_LOOKUPS: usize = 8;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Store(#[from] object_store::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    Unavailable(String),
}

/// A stored object as the backend reports it.
#[derive(Clone, Debug, PartialEq)]
pub struct BlobEntry {
    pub key: String,
    pub size: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
}

/// Minimal blob API the storage service needs.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Write `body` under `key`, replacing any existing object.
    ///
    /// Returns the key the backend actually stored the object under, which
    /// may differ from `key` if the backend has to escape characters.
    async fn put(&self, key: &str, body: Bytes, content_type: &str)
    -> Result<String, BackendError>;

    /// List stored objects in backend order.
    ///
    /// `prefix` is only honoured when [`supports_prefix_listing`] is true;
    /// otherwise callers must pass `None` and filter themselves.
    ///
    /// [`supports_prefix_listing`]: BlobBackend::supports_prefix_listing
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<BlobEntry>, BackendError>;

    fn supports_prefix_listing(&self) -> bool {
        false
    }

    /// Address under which a client can reach `key`.
    fn object_url(&self, key: &str) -> String;
}

/// [`BlobBackend`] over any `object_store` implementation.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    base_url: String,
    /// Whether the store accepts object attributes (content type) on put.
    store_attributes: bool,
}

impl ObjectStoreBackend {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        base_url: impl Into<String>,
        store_attributes: bool,
    ) -> Self {
        Self {
            store,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store_attributes,
        }
    }

    /// Azure Blob Storage container named by `cfg`.
    ///
    /// Credentials come from `credentials` when given, then from the account
    /// key, then the Azure CLI if enabled, and finally managed identity.
    pub fn azure(
        cfg: &StorageConfig,
        account: &str,
        credentials: Option<AzureCredentialProvider>,
    ) -> Result<Self, BackendError> {
        let mut builder = MicrosoftAzureBuilder::new()
            .with_account(account)
            .with_container_name(&cfg.container_name);

        if let Some(provider) = credentials {
            builder = builder.with_credentials(provider);
        } else if let Some(key) = &cfg.account_key {
            builder = builder.with_access_key(key);
        } else if cfg.use_azure_cli {
            builder = builder.with_use_azure_cli(true);
        }

        let store = builder.build()?;
        let base_url = format!(
            "https://{}.blob.core.windows.net/{}",
            account, cfg.container_name
        );
        Ok(Self::new(Arc::new(store), base_url, true))
    }

    /// Directory-backed store rooted at `cfg.storage_dir`, created if missing.
    pub fn local(cfg: &StorageConfig) -> Result<Self, BackendError> {
        fs::create_dir_all(&cfg.storage_dir)?;
        let root = fs::canonicalize(&cfg.storage_dir)?;
        let store = LocalFileSystem::new_with_prefix(&root)?;
        let base_url = format!("file://{}", root.display());
        // LocalFileSystem rejects put attributes.
        Ok(Self::new(Arc::new(store), base_url, false))
    }

    /// Content type stored with `location`, or `None` if the object has
    /// disappeared since it was listed.
    async fn content_type(&self, location: &Path) -> Result<Option<String>, BackendError> {
        let opts = GetOptions {
            head: true,
            ..Default::default()
        };
        match self.store.get_opts(location, opts).await {
            Ok(result) => Ok(result
                .attributes
                .get(&Attribute::ContentType)
                .map(|value| value.to_string())),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn from_config(
        cfg: &StorageConfig,
        credentials: Option<AzureCredentialProvider>,
    ) -> Result<Self, BackendError> {
        match cfg.backend {
            BackendKind::Azure => {
                let account = cfg.account_name.as_deref().ok_or_else(|| {
                    BackendError::Unavailable(
                        "AZURE_STORAGE_ACCOUNT_NAME must be configured".into(),
                    )
                })?;
                Self::azure(cfg, account, credentials)
            }
            BackendKind::Local => Self::local(cfg),
        }
    }
}

#[async_trait]
impl BlobBackend for ObjectStoreBackend {
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<String, BackendError> {
        let location = Path::from(key);

        let mut attributes = Attributes::new();
        if self.store_attributes {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&location, PutPayload::from(body), opts)
            .await?;
        debug!("stored object at {}", location);

        Ok(location.to_string())
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<BlobEntry>, BackendError> {
        let prefix = prefix
            .map(|p| p.trim_end_matches('/'))
            .filter(|p| !p.is_empty())
            .map(Path::from);

        let metas: Vec<ObjectMeta> = self.store.list(prefix.as_ref()).try_collect().await?;

        // Listings carry no attributes, so content types need a HEAD per object.
        stream::iter(metas)
            .map(|meta| async move {
                let content_type = if self.store_attributes {
                    self.content_type(&meta.location).await?
                } else {
                    None
                };
                Ok::<_, BackendError>(BlobEntry {
                    key: meta.location.to_string(),
                    size: meta.size,
                    created_at: None,
                    last_modified: Some(meta.last_modified),
                    content_type,
                })
            })
            .buffered(ATTRIBUTE_LOOKUPS)
            .try_collect()
            .await
    }

    fn supports_prefix_listing(&self) -> bool {
        true
    }

    fn object_url(&self, key: &str) -> String {
        let path: Vec<String> = key
            .split('/')
            .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
            .collect();
        format!("{}/{}", self.base_url, path.join("/"))
    }
}
