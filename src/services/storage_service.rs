//! src/services/storage_service.rs
//!
//! StorageService — names uploaded objects, hands them to the configured
//! [`BlobBackend`] and turns backend listings into per-owner views. It keeps
//! no state of its own; every call goes straight to the backend.

use crate::{
    config::StorageConfig,
    models::{listing::ListingEntry, upload::UploadResult},
    services::blob_backend::{BackendError, BlobBackend, ObjectStoreBackend},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::azure::AzureCredentialProvider;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

/// strftime pattern for the timestamp part of object keys.
const KEY_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    Configuration(String),
    #[error("Failed to upload file to blob storage: {0}")]
    Upload(#[source] BackendError),
    #[error("Failed to list blobs: {0}")]
    List(#[source] BackendError),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// StorageService provides the two operations the API exposes:
/// - Upload an object under a fresh, owner-scoped key
/// - List the objects belonging to an owner
#[derive(Clone)]
pub struct StorageService {
    backend: Arc<dyn BlobBackend>,
}

impl StorageService {
    pub fn new(backend: Arc<dyn BlobBackend>) -> Self {
        Self { backend }
    }

    /// Build the backend described by `cfg`.
    ///
    /// `credentials` replaces the default Azure credential chain when given.
    pub fn from_config(
        cfg: &StorageConfig,
        credentials: Option<AzureCredentialProvider>,
    ) -> StorageResult<Self> {
        let backend = ObjectStoreBackend::from_config(cfg, credentials)
            .map_err(|err| StorageError::Configuration(err.to_string()))?;
        Ok(Self::new(Arc::new(backend)))
    }

    /// Store `body` under a new key derived from `filename` and `owner`.
    ///
    /// Nothing is retried; any backend failure is returned as
    /// [`StorageError::Upload`].
    pub async fn upload(
        &self,
        body: Bytes,
        filename: &str,
        content_type: &str,
        owner: Option<&str>,
    ) -> StorageResult<UploadResult> {
        let key = object_key(filename, owner, Utc::now());
        let size_bytes = body.len() as u64;

        let stored_key = self
            .backend
            .put(&key, body, content_type)
            .await
            .map_err(|err| {
                error!("upload of {} failed: {}", key, err);
                StorageError::Upload(err)
            })?;

        Ok(UploadResult {
            success: true,
            object_url: self.backend.object_url(&stored_key),
            object_key: stored_key,
            original_filename: filename.to_string(),
            size_bytes,
            content_type: content_type.to_string(),
            uploaded_at: Utc::now(),
        })
    }

    /// List objects, restricted to `<owner>/` when an owner is given.
    ///
    /// Backends that can filter by prefix do so server-side. For the rest the
    /// whole container is listed and filtered here, which costs one full
    /// listing per call. Backend order is preserved either way.
    pub async fn list(&self, owner: Option<&str>) -> StorageResult<Vec<ListingEntry>> {
        let prefix = owner.map(|o| format!("{}/", o));

        let entries = if self.backend.supports_prefix_listing() {
            self.backend.list(prefix.as_deref()).await
        } else {
            self.backend.list(None).await.map(|all| {
                let total = all.len();
                let kept: Vec<_> = match &prefix {
                    Some(p) => all.into_iter().filter(|e| e.key.starts_with(p.as_str())).collect(),
                    None => all,
                };
                debug!("client-side filter kept {} of {} objects", kept.len(), total);
                kept
            })
        }
        .map_err(|err| {
            error!("listing objects failed: {}", err);
            StorageError::List(err)
        })?;

        Ok(entries
            .into_iter()
            .map(|e| ListingEntry {
                name: e.key,
                size_bytes: e.size,
                created_at: e.created_at,
                modified_at: e.last_modified,
                content_type: e.content_type,
            })
            .collect())
    }
}

/// Build `[<owner>/]<timestamp>_<uuid>.<ext>`.
///
/// `ext` is whatever follows the last `.` of `filename`; a filename without a
/// dot still yields the trailing `.`.
pub fn object_key(filename: &str, owner: Option<&str>, now: DateTime<Utc>) -> String {
    let name = format!(
        "{}_{}.{}",
        now.format(KEY_TIMESTAMP_FORMAT),
        Uuid::new_v4(),
        file_extension(filename)
    );
    match owner {
        Some(owner) if !owner.is_empty() => format!("{}/{}", owner, name),
        _ => name,
    }
}

fn file_extension(filename: &str) -> &str {
    filename.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::BackendKind,
        services::blob_backend::{BlobEntry, ObjectStoreBackend},
    };
    use async_trait::async_trait;
    use chrono::TimeZone;
    use object_store::memory::InMemory;
    use std::{collections::HashSet, path::PathBuf, sync::Mutex};

    /// Backend without prefix support that records what it was asked.
    #[derive(Default)]
    struct FlatBackend {
        objects: Vec<BlobEntry>,
        list_prefixes: Mutex<Vec<Option<String>>>,
        fail: bool,
    }

    impl FlatBackend {
        fn with_keys(keys: &[&str]) -> Self {
            Self {
                objects: keys
                    .iter()
                    .map(|k| BlobEntry {
                        key: k.to_string(),
                        size: 3,
                        created_at: None,
                        last_modified: None,
                        content_type: Some("text/plain".into()),
                    })
                    .collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl BlobBackend for FlatBackend {
        async fn put(&self, key: &str, _body: Bytes, _ct: &str) -> Result<String, BackendError> {
            if self.fail {
                return Err(BackendError::Unavailable("account is throttled".into()));
            }
            Ok(key.to_string())
        }

        async fn list(&self, prefix: Option<&str>) -> Result<Vec<BlobEntry>, BackendError> {
            self.list_prefixes
                .lock()
                .unwrap()
                .push(prefix.map(String::from));
            if self.fail {
                return Err(BackendError::Unavailable("container not found".into()));
            }
            Ok(self.objects.clone())
        }

        fn object_url(&self, key: &str) -> String {
            format!("flat://{}", key)
        }
    }

    fn memory_service() -> StorageService {
        StorageService::new(Arc::new(ObjectStoreBackend::new(
            Arc::new(InMemory::new()),
            "https://demo.blob.core.windows.net/uploads",
            true,
        )))
    }

    #[test]
    fn key_shape_with_owner() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let key = object_key("report.final.pdf", Some("user-123"), now);

        let rest = key.strip_prefix("user-123/20240309_070501_").unwrap();
        let (uuid, ext) = rest.split_once('.').unwrap();
        assert!(Uuid::parse_str(uuid).is_ok());
        assert_eq!(ext, "pdf");
    }

    #[test]
    fn key_shape_without_owner_or_extension() {
        let now = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();

        let key = object_key("README", None, now);
        assert!(key.starts_with("20241231_235959_"));
        assert!(key.ends_with('.'));
        assert!(!key.contains('/'));

        let key = object_key("notes.txt", Some(""), now);
        assert!(key.starts_with("20241231_235959_"));
        assert!(key.ends_with(".txt"));
    }

    #[test]
    fn keys_never_collide_for_same_name_and_second() {
        let now = Utc::now();
        let keys: HashSet<String> = (0..1000)
            .map(|_| object_key("photo.jpg", Some("user-123"), now))
            .collect();
        assert_eq!(keys.len(), 1000);
    }

    #[tokio::test]
    async fn upload_returns_result_for_stored_object() {
        let service = memory_service();
        let body = Bytes::from_static(b"%PDF-1.7 tiny");

        let result = service
            .upload(body.clone(), "report.pdf", "application/pdf", Some("user-123"))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.object_key.starts_with("user-123/"));
        assert!(result.object_key.ends_with(".pdf"));
        assert_eq!(
            result.object_url,
            format!(
                "https://demo.blob.core.windows.net/uploads/{}",
                result.object_key
            )
        );
        assert_eq!(result.original_filename, "report.pdf");
        assert_eq!(result.size_bytes, body.len() as u64);
        assert_eq!(result.content_type, "application/pdf");

        let listed = service.list(Some("user-123")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, result.object_key);
        assert_eq!(listed[0].size_bytes, body.len() as u64);
    }

    #[tokio::test]
    async fn concurrent_uploads_of_same_name_get_distinct_keys() {
        let service = memory_service();
        let uploads = (0..16).map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .upload(Bytes::from_static(b"x"), "same.txt", "text/plain", Some("user-123"))
                    .await
                    .unwrap()
                    .object_key
            })
        });
        let keys: HashSet<String> = futures::future::join_all(uploads)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(keys.len(), 16);
        assert_eq!(service.list(Some("user-123")).await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn upload_failure_is_wrapped() {
        let service = StorageService::new(Arc::new(FlatBackend {
            fail: true,
            ..FlatBackend::default()
        }));
        let err = service
            .upload(Bytes::from_static(b"x"), "a.txt", "text/plain", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Upload(_)));
        assert_eq!(
            err.to_string(),
            "Failed to upload file to blob storage: account is throttled"
        );
    }

    #[tokio::test]
    async fn flat_backend_is_filtered_client_side_in_order() {
        let backend = Arc::new(FlatBackend::with_keys(&[
            "user-123/c.txt",
            "other/a.txt",
            "user-123/a.txt",
            "user-1234/b.txt",
            "loose.txt",
            "user-123/b.txt",
        ]));
        let service = StorageService::new(backend.clone());

        let names: Vec<String> = service
            .list(Some("user-123"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(
            names,
            vec!["user-123/c.txt", "user-123/a.txt", "user-123/b.txt"]
        );
        assert_eq!(*backend.list_prefixes.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn list_without_owner_returns_everything() {
        let service = StorageService::new(Arc::new(FlatBackend::with_keys(&["a", "b/c"])));
        let entries = service.list(None).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn list_for_owner_without_objects_is_empty() {
        let service = StorageService::new(Arc::new(FlatBackend::with_keys(&["someone/a.txt"])));
        assert!(service.list(Some("user-123")).await.unwrap().is_empty());
        assert!(memory_service().list(Some("user-123")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_failure_is_wrapped() {
        let service = StorageService::new(Arc::new(FlatBackend {
            fail: true,
            ..FlatBackend::default()
        }));
        let err = service.list(Some("user-123")).await.unwrap_err();
        assert!(matches!(err, StorageError::List(_)));
        assert_eq!(err.to_string(), "Failed to list blobs: container not found");
    }

    #[test]
    fn missing_account_is_a_configuration_error() {
        let cfg = StorageConfig {
            backend: BackendKind::Azure,
            storage_dir: PathBuf::from("unused"),
            account_name: None,
            account_key: None,
            container_name: "uploads".into(),
            use_azure_cli: false,
        };
        let err = match StorageService::from_config(&cfg, None) {
            Err(err) => err,
            Ok(_) => panic!("expected configuration error"),
        };
        assert!(matches!(err, StorageError::Configuration(_)));
        assert!(err.to_string().contains("AZURE_STORAGE_ACCOUNT_NAME"));
    }
}
