//! OAuth2 authorization-code login against the identity provider.
//!
//! `start` issues the CSRF state and redirect-back cookies and sends the browser
//! to the provider. `callback` checks the returned state, exchanges the code,
//! validates the resulting token, syncs the local user and hands the token back
//! in the `token` cookie. Every terminal failure becomes a redirect to the
//! failure page carrying a reason; the flow cookies are dropped either way.

use axum::response::Redirect;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::FederationConfig;
use crate::dtos::auth::SsoCallbackQuery;
use crate::models::User;
use crate::utils::generate_state;

use super::error::ServiceError;
use super::identity::IdentitySynchronizer;
use super::keycloak::{IdentityProvider, ProviderError};
use super::metrics::record_sso_callback;
use super::token_validator::{TokenError, TokenValidator};

pub const STATE_COOKIE: &str = "sso_state";
pub const REDIRECT_COOKIE: &str = "sso_redirect_uri";
pub const TOKEN_COOKIE: &str = "token";

const FLOW_COOKIE_MINUTES: i64 = 10;

#[derive(Error, Debug)]
pub enum FederationError {
    #[error("Invalid state parameter")]
    StateMismatch,

    #[error("{0}")]
    Denied(String),

    #[error("Missing authorization code")]
    MissingCode,

    #[error("Identity provider unavailable")]
    Upstream(#[from] ProviderError),

    #[error("Invalid identity token")]
    Validation(#[from] TokenError),

    #[error("Could not establish local account")]
    Sync(#[from] ServiceError),
}

impl FederationError {
    fn outcome(&self) -> &'static str {
        match self {
            FederationError::StateMismatch => "state_mismatch",
            FederationError::Denied(_) => "denied",
            FederationError::MissingCode => "missing_code",
            FederationError::Upstream(_) => "upstream_error",
            FederationError::Validation(_) => "invalid_token",
            FederationError::Sync(_) => "sync_error",
        }
    }
}

/// A completed login.
#[derive(Debug)]
pub struct FederatedLogin {
    pub user: User,
    pub access_token: String,
    pub expires_at: i64,
    pub redirect_to: String,
}

pub struct FederationController {
    provider: Arc<dyn IdentityProvider>,
    validator: Arc<TokenValidator>,
    identity: IdentitySynchronizer,
    config: FederationConfig,
    allowed_origins: Vec<String>,
}

impl FederationController {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        validator: Arc<TokenValidator>,
        identity: IdentitySynchronizer,
        config: FederationConfig,
        allowed_origins: Vec<String>,
    ) -> Self {
        Self {
            provider,
            validator,
            identity,
            config,
            allowed_origins,
        }
    }

    pub fn validator(&self) -> &Arc<TokenValidator> {
        &self.validator
    }

    pub fn identity(&self) -> &IdentitySynchronizer {
        &self.identity
    }

    fn flow_cookie(&self, name: &'static str, value: String) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .secure(self.config.secure_cookies)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::minutes(FLOW_COOKIE_MINUTES))
            .build()
    }

    /// Accept relative paths and absolute URLs on an allowed origin.
    pub fn is_allowed_redirect(&self, target: &str) -> bool {
        if target.starts_with('/') {
            return !target.starts_with("//") && !target.contains('\\');
        }
        match reqwest::Url::parse(target) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let origin = url.origin().ascii_serialization();
                self.allowed_origins.iter().any(|o| o.trim_end_matches('/') == origin)
            }
            _ => false,
        }
    }

    fn failure_redirect(&self, reason: &str) -> Redirect {
        let query = serde_urlencoded::to_string([("error", reason)]).unwrap_or_default();
        let separator = if self.config.failure_url.contains('?') { '&' } else { '?' };
        Redirect::temporary(&format!("{}{}{}", self.config.failure_url, separator, query))
    }

    pub fn start(&self, jar: CookieJar, requested_redirect: Option<&str>) -> (CookieJar, Redirect) {
        let state = generate_state();
        let location = self.provider.authorization_url(&state);

        let mut jar = jar.add(self.flow_cookie(STATE_COOKIE, state));
        match requested_redirect {
            Some(target) if self.is_allowed_redirect(target) => {
                jar = jar.add(self.flow_cookie(REDIRECT_COOKIE, target.to_string()));
            }
            Some(target) => {
                tracing::warn!(redirect = target, "Ignoring redirect target outside allowed origins");
                jar = jar.remove(Cookie::build(REDIRECT_COOKIE).path("/"));
            }
            None => {
                jar = jar.remove(Cookie::build(REDIRECT_COOKIE).path("/"));
            }
        }

        tracing::debug!("Redirecting to identity provider");
        (jar, Redirect::temporary(&location))
    }

    pub async fn callback(&self, jar: CookieJar, query: SsoCallbackQuery) -> (CookieJar, Redirect) {
        let result = self.complete(&jar, query).await;

        let jar = jar
            .remove(Cookie::build(STATE_COOKIE).path("/"))
            .remove(Cookie::build(REDIRECT_COOKIE).path("/"));

        match result {
            Ok(login) => {
                record_sso_callback("success");
                tracing::info!(user_id = login.user.id, username = %login.user.username, "Federated login completed");
                let max_age = (login.expires_at - Utc::now().timestamp()).max(0);
                let token_cookie = Cookie::build((TOKEN_COOKIE, login.access_token))
                    .path("/")
                    .http_only(true)
                    .secure(self.config.secure_cookies)
                    .same_site(SameSite::Lax)
                    .max_age(time::Duration::seconds(max_age))
                    .build();
                (jar.add(token_cookie), Redirect::temporary(&login.redirect_to))
            }
            Err(err) => {
                record_sso_callback(err.outcome());
                match &err {
                    FederationError::Upstream(e) => {
                        tracing::error!(error = %e, "Identity provider call failed during callback")
                    }
                    FederationError::Sync(e) => {
                        tracing::error!(error = %e, "Federated user sync failed")
                    }
                    other => tracing::warn!(reason = %other, outcome = other.outcome(), "Federated login rejected"),
                }
                (jar, self.failure_redirect(&err.to_string()))
            }
        }
    }

    async fn complete(&self, jar: &CookieJar, query: SsoCallbackQuery) -> Result<FederatedLogin, FederationError> {
        if let Some(error) = query.error {
            let reason = query
                .error_description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or(error);
            return Err(FederationError::Denied(reason));
        }

        let stored = jar.get(STATE_COOKIE).map(|c| c.value().to_string()).unwrap_or_default();
        let returned = query.state.unwrap_or_default();
        let matches: bool = stored.as_bytes().ct_eq(returned.as_bytes()).into();
        if stored.is_empty() || !matches {
            return Err(FederationError::StateMismatch);
        }

        let code = query
            .code
            .filter(|c| !c.is_empty())
            .ok_or(FederationError::MissingCode)?;

        let tokens = self.provider.exchange_code(&code).await?;
        let claims = self.validator.validate(&tokens.access_token)?;
        let user = self.identity.sync(&claims).await?;

        let redirect_to = jar
            .get(REDIRECT_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|target| self.is_allowed_redirect(target))
            .unwrap_or_else(|| self.config.success_url.clone());

        Ok(FederatedLogin {
            user,
            access_token: tokens.access_token,
            expires_at: claims.exp,
            redirect_to,
        })
    }

    /// Drop the token cookie and end the provider session.
    pub fn logout(&self, jar: CookieJar) -> (CookieJar, Redirect) {
        let location = self.provider.end_session_url(&self.config.success_url);
        (
            jar.remove(Cookie::build(TOKEN_COOKIE).path("/")),
            Redirect::temporary(&location),
        )
    }
}
