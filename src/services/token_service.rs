//! src/services/token_service.rs
//!
//! Bearer token validation for the auth middleware.
//!
//! Two modes exist. `Verified` looks up the signing key in the tenant's JSON
//! Web Key Set and checks signature, issuer, audience and expiry. `Insecure`
//! only decodes the claims and checks expiry; anyone can forge such a token,
//! so it is meant for local demos with hand-minted tokens.

use crate::{
    config::{AuthConfig, TokenMode},
    models::identity::Identity,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation,
    errors::{Error as JwtError, ErrorKind},
    jwk::JwkSet,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    /// The token could not be decoded or failed a check.
    #[error("{0}")]
    Invalid(String),
    /// Anything that is not the token's fault, e.g. the key set is unreachable.
    #[error("{0}")]
    Other(String),
}

impl From<JwtError> for TokenError {
    fn from(err: JwtError) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::Crypto(_) => TokenError::Other(err.to_string()),
            _ => TokenError::Invalid(err.to_string()),
        }
    }
}

/// Claims we read from the token. Anything else is ignored.
#[derive(Debug, Deserialize)]
struct IdentityClaims {
    #[serde(default)]
    oid: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl From<IdentityClaims> for Identity {
    fn from(claims: IdentityClaims) -> Self {
        Identity {
            subject_id: claims.oid.unwrap_or_default(),
            email: claims.preferred_username.unwrap_or_default(),
            display_name: claims.name.unwrap_or_default(),
        }
    }
}

/// Source of the signing keys for `Verified` mode.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn key_set(&self) -> Result<JwkSet, TokenError>;
}

/// Fetches the key set over HTTPS on every call.
pub struct RemoteKeySource {
    client: reqwest::Client,
    jwks_uri: String,
}

impl RemoteKeySource {
    pub fn new(jwks_uri: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            jwks_uri: jwks_uri.into(),
        }
    }
}

#[async_trait]
impl KeySource for RemoteKeySource {
    async fn key_set(&self) -> Result<JwkSet, TokenError> {
        debug!("fetching signing keys from {}", self.jwks_uri);
        let response = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|err| TokenError::Other(format!("fetching signing keys: {err}")))?;

        response
            .json::<JwkSet>()
            .await
            .map_err(|err| TokenError::Other(format!("parsing signing keys: {err}")))
    }
}

pub enum TokenValidator {
    Insecure,
    Verified {
        keys: Arc<dyn KeySource>,
        issuer: String,
        audience: String,
    },
}

impl TokenValidator {
    pub fn from_config(cfg: &AuthConfig) -> anyhow::Result<Self> {
        match cfg.mode {
            TokenMode::Insecure => Ok(TokenValidator::Insecure),
            TokenMode::Verified => {
                let jwks_uri = cfg.jwks_uri().context("verified mode requires a tenant id")?;
                let issuer = cfg.issuer().context("verified mode requires a tenant id")?;
                let audience = cfg
                    .client_id
                    .clone()
                    .context("verified mode requires a client id")?;
                Ok(TokenValidator::Verified {
                    keys: Arc::new(RemoteKeySource::new(jwks_uri)),
                    issuer,
                    audience,
                })
            }
        }
    }

    pub fn is_insecure(&self) -> bool {
        matches!(self, TokenValidator::Insecure)
    }

    /// Check `token` and return the identity its claims describe.
    pub async fn validate(&self, token: &str) -> Result<Identity, TokenError> {
        match self {
            TokenValidator::Insecure => decode_unverified(token),
            TokenValidator::Verified {
                keys,
                issuer,
                audience,
            } => decode_verified(token, keys.as_ref(), issuer, audience).await,
        }
    }
}

fn decode_unverified(token: &str) -> Result<Identity, TokenError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation.leeway = 0;

    // The key is never consulted once signature validation is off.
    let data = jsonwebtoken::decode::<IdentityClaims>(
        token,
        &DecodingKey::from_secret(&[]),
        &validation,
    )?;
    Ok(data.claims.into())
}

async fn decode_verified(
    token: &str,
    keys: &dyn KeySource,
    issuer: &str,
    audience: &str,
) -> Result<Identity, TokenError> {
    let header = jsonwebtoken::decode_header(token)?;
    let kid = header
        .kid
        .ok_or_else(|| TokenError::Invalid("token header has no key id".into()))?;

    let set = keys.key_set().await?;
    let jwk = set
        .find(&kid)
        .ok_or_else(|| TokenError::Invalid("Public key not found".into()))?;
    let key = DecodingKey::from_jwk(jwk)?;

    // The key family must match the algorithm, so a forged `alg` cannot
    // downgrade an RSA key to HMAC.
    let mut validation = Validation::new(header.alg);
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[audience]);
    validation.leeway = 0;

    let data = jsonwebtoken::decode::<IdentityClaims>(token, &key, &validation)?;
    Ok(data.claims.into())
}

/// HS256 demo token for exercising a gateway running in `Insecure` mode.
pub fn mint_test_token(subject: &str, email: &str, name: &str) -> Result<String, TokenError> {
    let now = Utc::now();
    let claims = json!({
        "oid": subject,
        "preferred_username": email,
        "name": name,
        "exp": (now + Duration::hours(24)).timestamp(),
        "iat": now.timestamp(),
    });
    Ok(jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"secret"),
    )?)
}
