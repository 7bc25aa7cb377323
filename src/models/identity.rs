//! Caller identity derived from bearer-token claims.

use crate::errors::ApiError;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Who is calling, as asserted by the token's claims.
///
/// Inserted into the request extensions by the auth middleware. Claims that
/// are missing from the token are kept as empty strings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    /// `oid` claim.
    pub subject_id: String,

    /// `preferred_username` claim.
    pub email: String,

    /// `name` claim.
    pub display_name: String,
}

impl Identity {
    /// Owner id used to namespace object keys, if the token carried one.
    pub fn owner(&self) -> Option<&str> {
        if self.subject_id.is_empty() {
            None
        } else {
            Some(&self.subject_id)
        }
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(ApiError::AuthHeaderMissing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn empty_subject_has_no_owner() {
        let identity = Identity::default();
        assert_eq!(identity.owner(), None);

        let identity = Identity {
            subject_id: "user-123".into(),
            ..Identity::default()
        };
        assert_eq!(identity.owner(), Some("user-123"));
    }

    #[tokio::test]
    async fn extractor_rejects_requests_without_identity() {
        let (mut parts, _) = Request::new(()).into_parts();
        let err = Identity::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AuthHeaderMissing));

        let identity = Identity {
            subject_id: "user-123".into(),
            email: "test@example.com".into(),
            display_name: "Test User".into(),
        };
        parts.extensions.insert(identity.clone());
        let extracted = Identity::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(extracted, identity);
    }
}
