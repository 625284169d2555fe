//! Verification of bearer tokens issued by the identity provider.
//!
//! Signing keys come from a [`KeyResolver`]. In production that is a
//! [`JwksCache`] refreshed from the provider's discovery document; tests load a
//! fixed key set into the same cache.

use jsonwebtoken::{
    decode, decode_header,
    errors::ErrorKind,
    jwk::JwkSet,
    Algorithm, DecodingKey, Validation,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use super::keycloak::IdentityProvider;
use super::metrics::record_token_validation;

/// Provider tokens are RSA-signed; anything else is refused before key lookup.
const ALLOWED_ALGORITHMS: [Algorithm; 3] = [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("signing key not found: {0}")]
    KeyNotFound(String),

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("key set unavailable: {0}")]
    KeySetUnavailable(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Claims read from a verified provider token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederatedClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub realm_access: RealmAccess,
    pub iss: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

impl FederatedClaims {
    pub fn roles(&self) -> &[String] {
        &self.realm_access.roles
    }
}

/// Resolves a signing key by key id.
pub trait KeyResolver: Send + Sync {
    fn resolve(&self, kid: &str) -> Result<DecodingKey, TokenError>;

    /// Whether a key set has been loaded at least once.
    fn is_ready(&self) -> bool;
}

/// The provider's published key set. Readers always see either the previous or
/// the next complete set; a failed refresh keeps the last good one.
#[derive(Default)]
pub struct JwksCache {
    keys: RwLock<Option<Arc<JwkSet>>>,
}

impl JwksCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(set: JwkSet) -> Self {
        let cache = Self::new();
        cache.replace(set);
        cache
    }

    pub fn replace(&self, set: JwkSet) {
        let set = Arc::new(set);
        *self.keys.write().unwrap_or_else(PoisonError::into_inner) = Some(set);
    }

    fn current(&self) -> Option<Arc<JwkSet>> {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Fetch the key set through the provider's discovery document and swap it in.
    pub async fn refresh(&self, provider: &dyn IdentityProvider) -> Result<usize, TokenError> {
        let set = provider
            .fetch_key_set()
            .await
            .map_err(|e| TokenError::KeySetUnavailable(e.to_string()))?;
        let count = set.keys.len();
        self.replace(set);
        Ok(count)
    }
}

impl KeyResolver for JwksCache {
    fn resolve(&self, kid: &str) -> Result<DecodingKey, TokenError> {
        let set = self
            .current()
            .ok_or_else(|| TokenError::KeyNotFound("key set not loaded".to_string()))?;
        let jwk = set
            .find(kid)
            .ok_or_else(|| TokenError::KeyNotFound(format!("unknown kid {}", kid)))?;
        DecodingKey::from_jwk(jwk).map_err(|e| TokenError::Invalid(format!("unusable signing key: {}", e)))
    }

    fn is_ready(&self) -> bool {
        self.current().is_some()
    }
}

pub struct TokenValidator {
    resolver: Arc<dyn KeyResolver>,
    issuer: String,
    leeway_seconds: u64,
}

impl TokenValidator {
    pub fn new(resolver: Arc<dyn KeyResolver>, issuer: String, leeway_seconds: u64) -> Self {
        Self {
            resolver,
            issuer,
            leeway_seconds,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn is_ready(&self) -> bool {
        self.resolver.is_ready()
    }

    pub fn validate(&self, token: &str) -> Result<FederatedClaims, TokenError> {
        let result = self.validate_inner(token);
        record_token_validation(match &result {
            Ok(_) => "success",
            Err(TokenError::KeyNotFound(_)) => "key_not_found",
            Err(_) => "invalid",
        });
        result
    }

    fn validate_inner(&self, token: &str) -> Result<FederatedClaims, TokenError> {
        let header = decode_header(token)
            .map_err(|e| TokenError::Invalid(format!("malformed token: {}", e)))?;

        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(TokenError::Invalid(format!("unsupported algorithm {:?}", header.alg)));
        }

        let kid = header
            .kid
            .ok_or_else(|| TokenError::Invalid("token header has no kid".to_string()))?;
        let key = self.resolver.resolve(&kid)?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.leeway = self.leeway_seconds;

        let data = decode::<FederatedClaims>(token, &key, &validation).map_err(|e| {
            TokenError::Invalid(match e.kind() {
                ErrorKind::ExpiredSignature => "token expired".to_string(),
                ErrorKind::ImmatureSignature => "token not yet valid".to_string(),
                ErrorKind::InvalidIssuer => "issuer mismatch".to_string(),
                ErrorKind::InvalidSignature => "signature verification failed".to_string(),
                ErrorKind::MissingRequiredClaim(claim) => format!("missing claim {}", claim),
                _ => e.to_string(),
            })
        })?;

        Ok(data.claims)
    }
}
