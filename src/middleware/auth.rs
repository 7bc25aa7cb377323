//! Bearer-token gate.
//!
//! Runs in front of every route. Public prefixes pass straight through; any
//! other request must carry `Authorization: Bearer <token>` that the
//! configured [`TokenValidator`](crate::services::token_service::TokenValidator)
//! accepts. The resulting [`Identity`] is stored in the request extensions.

use crate::{errors::ApiError, models::identity::Identity, state::AppState};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

const BEARER_PREFIX: &str = "Bearer ";

pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.is_public(req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let token = bearer_token(req.headers())
        .inspect_err(|err| warn!(path = %req.uri().path(), "rejected request: {:?}", err))?
        .to_string();

    let identity: Identity = state.validator.validate(&token).await.map_err(|err| {
        warn!(path = %req.uri().path(), "token rejected: {}", err);
        ApiError::from(err)
    })?;

    debug!(subject = %identity.subject_id, "token accepted");
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Pull the raw token out of the `Authorization` header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(ApiError::AuthHeaderMissing)?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .ok_or(ApiError::AuthHeaderMalformed)
}
