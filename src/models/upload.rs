//! Result of a single successful upload.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata returned to the client once an object has been written.
///
/// Field names on the wire match the `blob_*` names existing clients expect.
#[derive(Serialize, Clone, Debug)]
pub struct UploadResult {
    pub success: bool,

    /// Storage key, `[owner/]<timestamp>_<uuid>.<ext>`.
    #[serde(rename = "blob_name")]
    pub object_key: String,

    /// Public URL of the stored object.
    #[serde(rename = "blob_url")]
    pub object_url: String,

    pub original_filename: String,

    #[serde(rename = "size")]
    pub size_bytes: u64,

    pub content_type: String,

    pub uploaded_at: DateTime<Utc>,
}
