use chrono::{DateTime, Utc};
use serde::Serialize;

/// One object as reported by the storage backend's listing.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ListingEntry {
    pub name: String,

    #[serde(rename = "size")]
    pub size_bytes: u64,

    #[serde(rename = "created_on")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(rename = "last_modified")]
    pub modified_at: Option<DateTime<Utc>>,

    pub content_type: Option<String>,
}
