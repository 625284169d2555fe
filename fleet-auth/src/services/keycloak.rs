//! Client for the identity provider's OpenID Connect endpoints (Keycloak realm).

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::FederationConfig;

/// Requested scopes for the authorization-code flow.
pub const SCOPES: &str = "openid profile email";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },
}

/// Tokens returned by the code exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Browser redirect target that starts a login carrying `state`.
    fn authorization_url(&self, state: &str) -> String;

    /// Provider logout page that returns the browser to `redirect`.
    fn end_session_url(&self, redirect: &str) -> String;

    async fn exchange_code(&self, code: &str) -> Result<TokenSet, ProviderError>;

    async fn fetch_key_set(&self) -> Result<JwkSet, ProviderError>;
}

#[derive(Clone)]
pub struct KeycloakClient {
    http: reqwest::Client,
    issuer: String,
    client_id: String,
    client_secret: SecretString,
    callback_url: String,
}

impl KeycloakClient {
    pub fn new(config: &FederationConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build identity provider HTTP client: {}", e))?;

        Ok(Self {
            http,
            issuer: config.issuer(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            callback_url: config.callback_url.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/protocol/openid-connect/{}", self.issuer, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: &str,
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| ProviderError::Http { endpoint, source })?;
        read_json(endpoint, response).await
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    endpoint: &'static str,
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let mut body = response.text().await.unwrap_or_default();
        body.truncate(512);
        return Err(ProviderError::Status {
            endpoint,
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|source| ProviderError::Http { endpoint, source })
}

#[async_trait]
impl IdentityProvider for KeycloakClient {
    fn authorization_url(&self, state: &str) -> String {
        let query = serde_urlencoded::to_string([
            ("response_type", "code"),
            ("scope", SCOPES),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.callback_url.as_str()),
            ("state", state),
        ])
        .unwrap_or_default();
        format!("{}?{}", self.endpoint("auth"), query)
    }

    fn end_session_url(&self, redirect: &str) -> String {
        let query = serde_urlencoded::to_string([
            ("client_id", self.client_id.as_str()),
            ("post_logout_redirect_uri", redirect),
        ])
        .unwrap_or_default();
        format!("{}?{}", self.endpoint("logout"), query)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet, ProviderError> {
        const ENDPOINT: &str = "token endpoint";
        let response = self
            .http
            .post(self.endpoint("token"))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.callback_url.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret().as_str()),
            ])
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                endpoint: ENDPOINT,
                source,
            })?;
        read_json(ENDPOINT, response).await
    }

    async fn fetch_key_set(&self) -> Result<JwkSet, ProviderError> {
        let discovery: DiscoveryDocument = self
            .get_json(
                "discovery endpoint",
                &format!("{}/.well-known/openid-configuration", self.issuer),
            )
            .await?;
        self.get_json("jwks endpoint", &discovery.jwks_uri).await
    }
}
