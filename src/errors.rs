use crate::services::{storage_service::StorageError, token_service::TokenError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Every way a request can fail. All of them end the request.
///
/// The `Display` text is the human-readable `message` of the JSON body; the
/// machine-readable `error` label comes from [`ApiError::label`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Please provide a valid Bearer token")]
    AuthHeaderMissing,
    #[error("Please provide a valid Bearer token")]
    AuthHeaderMalformed,
    #[error("Your authentication token has expired")]
    TokenExpired,
    #[error("{0}")]
    TokenInvalid(String),
    #[error("{0}")]
    AuthGeneric(String),
    #[error("Please include a file in the request with key \"file\"")]
    NoFileProvided,
    #[error("File size exceeds maximum allowed size of {limit_mb}MB")]
    FileTooLarge { limit_mb: usize },
    #[error("{0}")]
    ConfigurationError(String),
    #[error("{0}")]
    BackendUploadFailure(String),
    #[error("{0}")]
    BackendListFailure(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::AuthHeaderMissing
            | ApiError::AuthHeaderMalformed
            | ApiError::TokenExpired
            | ApiError::TokenInvalid(_)
            | ApiError::AuthGeneric(_) => StatusCode::UNAUTHORIZED,
            ApiError::NoFileProvided | ApiError::FileTooLarge { .. } => StatusCode::BAD_REQUEST,
            ApiError::ConfigurationError(_)
            | ApiError::BackendUploadFailure(_)
            | ApiError::BackendListFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ApiError::AuthHeaderMissing | ApiError::AuthHeaderMalformed => {
                "Missing or invalid Authorization header"
            }
            ApiError::TokenExpired => "Token expired",
            ApiError::TokenInvalid(_) => "Invalid token",
            ApiError::AuthGeneric(_) => "Authentication failed",
            ApiError::NoFileProvided => "No file provided",
            ApiError::FileTooLarge { .. } => "File too large",
            ApiError::ConfigurationError(_) => "Configuration error",
            ApiError::BackendUploadFailure(_) => "Upload failed",
            ApiError::BackendListFailure(_) => "Failed to retrieve files",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.label(),
            "message": self.to_string(),
        }));

        (self.status(), body).into_response()
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ApiError::TokenExpired,
            TokenError::Invalid(msg) => ApiError::TokenInvalid(msg),
            TokenError::Other(msg) => ApiError::AuthGeneric(msg),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Configuration(msg) => ApiError::ConfigurationError(msg),
            err @ StorageError::Upload(_) => ApiError::BackendUploadFailure(err.to_string()),
            err @ StorageError::List(_) => ApiError::BackendListFailure(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_json(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn missing_header_renders_label_and_message() {
        let (status, body) = body_json(ApiError::AuthHeaderMissing).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Missing or invalid Authorization header");
        assert_eq!(body["message"], "Please provide a valid Bearer token");
    }

    #[tokio::test]
    async fn file_too_large_restates_ceiling() {
        let (status, body) = body_json(ApiError::FileTooLarge { limit_mb: 50 }).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "File too large");
        assert_eq!(
            body["message"],
            "File size exceeds maximum allowed size of 50MB"
        );
    }

    #[test]
    fn statuses_follow_error_family() {
        assert_eq!(ApiError::TokenExpired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::AuthGeneric("boom".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::NoFileProvided.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::ConfigurationError("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::BackendListFailure("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn token_errors_map_onto_auth_variants() {
        assert!(matches!(
            ApiError::from(TokenError::Expired),
            ApiError::TokenExpired
        ));
        assert!(matches!(
            ApiError::from(TokenError::Invalid("bad".into())),
            ApiError::TokenInvalid(m) if m == "bad"
        ));
        assert!(matches!(
            ApiError::from(TokenError::Other("down".into())),
            ApiError::AuthGeneric(m) if m == "down"
        ));
    }
}
