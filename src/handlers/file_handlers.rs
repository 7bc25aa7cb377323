//! HTTP handlers for uploading and listing files.
//! Both require an authenticated [`Identity`] and delegate storage concerns to
//! `StorageService`.

use crate::{
    errors::ApiError,
    models::{identity::Identity, listing::ListingEntry, upload::UploadResult},
    state::AppState,
};
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tracing::{info, warn};

/// Largest accepted file, inclusive.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Request body ceiling: the file plus room for multipart framing.
pub const MAX_BODY_BYTES: usize = MAX_UPLOAD_BYTES + 1024 * 1024;

const FILE_FIELD: &str = "file";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    data: UploadResult,
}

#[derive(Serialize)]
struct ListResponse {
    message: &'static str,
    count: usize,
    data: Vec<ListingEntry>,
}

/// An uploaded file, fully read into memory.
struct FilePart {
    filename: String,
    content_type: String,
    bytes: Bytes,
}

/// `POST /api/upload/` — multipart form with a `file` field.
pub async fn upload_file(
    State(state): State<AppState>,
    identity: Identity,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        warn!("upload without multipart body: {}", rejection);
        ApiError::NoFileProvided
    })?;
    let file = read_file_field(&mut multipart).await?;

    let storage = state.storage()?;
    let result = storage
        .upload(
            file.bytes,
            &file.filename,
            &file.content_type,
            identity.owner(),
        )
        .await?;

    info!(
        key = %result.object_key,
        size = result.size_bytes,
        subject = %identity.subject_id,
        "file uploaded"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "File uploaded successfully",
            data: result,
        }),
    ))
}

/// `GET /api/files/` — objects uploaded by the caller.
pub async fn list_files(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<impl IntoResponse, ApiError> {
    let storage = state.storage()?;
    let entries = storage.list(identity.owner()).await?;

    Ok((
        StatusCode::OK,
        Json(ListResponse {
            message: "Files retrieved successfully",
            count: entries.len(),
            data: entries,
        }),
    ))
}

/// Find the `file` field and read it, refusing anything over
/// [`MAX_UPLOAD_BYTES`] as soon as the limit is crossed.
///
/// Fields without a filename are plain form values, not files, and are skipped.
async fn read_file_field(multipart: &mut Multipart) -> Result<FilePart, ApiError> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_owned();

        let mut buf = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            if buf.len() + chunk.len() > MAX_UPLOAD_BYTES {
                warn!("rejecting {}: larger than {} bytes", filename, MAX_UPLOAD_BYTES);
                return Err(file_too_large());
            }
            buf.extend_from_slice(&chunk);
        }

        return Ok(FilePart {
            filename,
            content_type,
            bytes: buf.freeze(),
        });
    }

    Err(ApiError::NoFileProvided)
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        file_too_large()
    } else {
        warn!("malformed multipart body: {}", err);
        ApiError::NoFileProvided
    }
}

fn file_too_large() -> ApiError {
    ApiError::FileTooLarge {
        limit_mb: MAX_UPLOAD_BYTES / (1024 * 1024),
    }
}
