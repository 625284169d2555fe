//! Shared setup for fleet-auth integration tests.
//!
//! Builds the full router over an in-memory store and, for federated
//! scenarios, a stub identity provider with the fixture signing key.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use fleet_auth::{
    build_router,
    config::{
        AuthConfig, DatabaseConfig, Environment, FederationConfig, RateLimitConfig, SecurityConfig,
        SessionConfig, StorageBackend, SwaggerConfig,
    },
    models::{AuthMethod, GlobalRole, NewUser, User},
    services::{
        AuthStore, FederatedClaims, IdentityProvider, InMemoryStore, JwksCache, ProviderError,
        RealmAccess, TokenSet,
    },
    utils::{hash_password, Password},
    AppState, FederationDeps,
};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, jwk::JwkSet, Algorithm, EncodingKey, Header};
use service_core::observability::detached_metrics_handle;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const ISSUER: &str = "https://sso.example.com/realms/fleet";
pub const APP_ORIGIN: &str = "https://app.example.com";
pub const TEST_BCRYPT_COST: u32 = 4;

const SIGNING_KEY: &[u8] = include_bytes!("../fixtures/signing_key.pem");
const SIGNING_JWK: &str = include_str!("../fixtures/signing_jwk.json");
const FOREIGN_KEY: &[u8] = include_bytes!("../fixtures/foreign_key.pem");

pub fn test_config() -> AuthConfig {
    AuthConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "fleet-auth-test".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        storage: StorageBackend::Memory,
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 0,
        },
        session: SessionConfig {
            ttl_hours: 24,
            bcrypt_cost: TEST_BCRYPT_COST,
            sweep_interval_seconds: 3600,
        },
        federation: FederationConfig::disabled(),
        security: SecurityConfig {
            allowed_origins: vec![APP_ORIGIN.to_string()],
        },
        swagger: SwaggerConfig { enabled: false },
        rate_limit: RateLimitConfig {
            login_attempts: 100,
            login_window_seconds: 60,
            global_ip_limit: 1000,
            global_ip_window_seconds: 60,
        },
    }
}

/// Federation on; `local_login_disabled` makes it federation-only.
pub fn federated_config(local_login_disabled: bool) -> AuthConfig {
    let mut config = test_config();
    config.federation = FederationConfig {
        enabled: true,
        provider_url: "https://sso.example.com".to_string(),
        realm: "fleet".to_string(),
        client_id: "fleet-api".to_string(),
        callback_url: "https://api.example.com/auth/sso/callback".to_string(),
        local_login_disabled,
        leeway_seconds: 0,
        ..FederationConfig::disabled()
    };
    config
}

/// Identity provider that hands out a fixed access token.
pub struct StubProvider {
    pub access_token: Option<String>,
}

#[async_trait]
impl IdentityProvider for StubProvider {
    fn authorization_url(&self, state: &str) -> String {
        format!("{}/protocol/openid-connect/auth?state={}", ISSUER, state)
    }

    fn end_session_url(&self, redirect: &str) -> String {
        format!(
            "{}/protocol/openid-connect/logout?post_logout_redirect_uri={}",
            ISSUER, redirect
        )
    }

    async fn exchange_code(&self, _code: &str) -> Result<TokenSet, ProviderError> {
        match &self.access_token {
            Some(token) => Ok(TokenSet {
                access_token: token.clone(),
                id_token: None,
                expires_in: Some(300),
            }),
            None => Err(ProviderError::Status {
                endpoint: "token endpoint",
                status: 503,
                body: String::new(),
            }),
        }
    }

    async fn fetch_key_set(&self) -> Result<JwkSet, ProviderError> {
        Ok(signing_key_set())
    }
}

pub fn signing_key_set() -> JwkSet {
    let jwk: serde_json::Value = serde_json::from_str(SIGNING_JWK).unwrap();
    serde_json::from_value(serde_json::json!({ "keys": [jwk] })).unwrap()
}

pub fn claims(username: &str, roles: &[&str]) -> FederatedClaims {
    FederatedClaims {
        sub: format!("sub-{}", username),
        preferred_username: Some(username.to_string()),
        email: Some(format!("{}@example.com", username)),
        realm_access: RealmAccess {
            roles: roles.iter().map(|r| r.to_string()).collect(),
        },
        iss: ISSUER.to_string(),
        exp: chrono::Utc::now().timestamp() + 300,
        nbf: None,
    }
}

pub fn sign(claims: &FederatedClaims) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some("signing-key".to_string());
    encode(&header, claims, &EncodingKey::from_rsa_pem(SIGNING_KEY).unwrap()).unwrap()
}

/// Signed with a key the provider never published, under the published kid.
pub fn sign_with_foreign_key(claims: &FederatedClaims) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some("signing-key".to_string());
    encode(&header, claims, &EncodingKey::from_rsa_pem(FOREIGN_KEY).unwrap()).unwrap()
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

impl TestResponse {
    pub fn location(&self) -> &str {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    pub fn error(&self) -> &str {
        self.body["error"].as_str().unwrap_or_default()
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config(), None)
    }

    /// `access_token` is what the stub provider returns from the code exchange.
    pub fn federated(local_login_disabled: bool, access_token: Option<String>) -> Self {
        Self::with_config(federated_config(local_login_disabled), access_token)
    }

    pub fn with_config(config: AuthConfig, access_token: Option<String>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let federation = config.federation.enabled.then(|| FederationDeps {
            provider: Arc::new(StubProvider { access_token }),
            keys: Arc::new(JwksCache::with_keys(signing_key_set())),
        });
        let state = AppState::new(config, store.clone(), federation, detached_metrics_handle());
        Self {
            router: build_router(state.clone()),
            state,
            store,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// JSON request; `authorization` is sent verbatim.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        authorization: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, authorization: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, authorization, None).await
    }

    pub async fn login(&self, username: &str, password: &str) -> TestResponse {
        self.request(
            Method::POST,
            "/auth/login",
            None,
            Some(serde_json::json!({ "username": username, "password": password })),
        )
        .await
    }

    /// Log in and return the session token, panicking on failure.
    pub async fn session_token(&self, username: &str, password: &str) -> String {
        let response = self.login(username, password).await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {:?}", response.body);
        response.body["token"].as_str().unwrap().to_string()
    }

    /// Register through the API as the first account, which becomes global admin.
    pub async fn bootstrap_admin(&self, username: &str, password: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/auth/register",
                None,
                Some(serde_json::json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        self.session_token(username, password).await
    }

    /// Insert a user directly, bypassing registration rules.
    pub async fn seed_user(
        &self,
        username: &str,
        password: Option<&str>,
        role: GlobalRole,
        auth_method: AuthMethod,
    ) -> User {
        let password_hash = password.map(|p| {
            hash_password(&Password::new(p.to_string()), TEST_BCRYPT_COST)
                .unwrap()
                .into_string()
        });
        self.store
            .create_user(NewUser {
                username: username.to_string(),
                password_hash,
                email: format!("{}@example.com", username),
                role,
                auth_method,
            })
            .await
            .unwrap()
    }
}
