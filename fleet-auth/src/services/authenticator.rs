//! Resolves the caller of a request through an ordered list of strategies.
//!
//! Each strategy either authenticates, skips (nothing usable for it, or a
//! recoverable failure), or fails the request outright. Order:
//! attached identity, federated bearer token or `token` cookie, raw session
//! token, break-glass bootstrap administrator.

use std::sync::Arc;

use crate::models::User;

use super::error::ServiceError;
use super::identity::IdentitySynchronizer;
use super::session::SessionService;
use super::token_validator::TokenValidator;

/// How the caller proved who they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Attached,
    FederatedToken,
    Session,
    Bootstrap,
}

/// An authenticated caller, stored in request extensions.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user: User,
    pub credential: CredentialKind,
}

#[derive(Debug)]
pub enum AuthOutcome {
    Authenticated(Identity),
    Skip,
    Fail(ServiceError),
}

/// Credential material taken from one request.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestCredentials<'a> {
    pub attached: Option<&'a Identity>,
    pub authorization: Option<&'a str>,
    pub token_cookie: Option<&'a str>,
    pub path: &'a str,
}

impl<'a> RequestCredentials<'a> {
    /// The `Bearer` token from the header, else the `token` cookie.
    fn federated_token(&self) -> Option<&'a str> {
        self.authorization
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or_else(|| self.token_cookie.map(str::trim).filter(|t| !t.is_empty()))
    }

    fn session_token(&self) -> Option<&'a str> {
        self.authorization.map(str::trim).filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Copy)]
enum Strategy {
    Attached,
    Federated,
    Session,
    Bootstrap,
}

const PIPELINE: [Strategy; 4] = [
    Strategy::Attached,
    Strategy::Federated,
    Strategy::Session,
    Strategy::Bootstrap,
];

/// Only store failures abort the pipeline; everything else is the caller's problem.
fn is_fatal(err: &ServiceError) -> bool {
    matches!(err, ServiceError::Store(_) | ServiceError::Internal(_))
}

#[derive(Clone)]
pub struct Authenticator {
    sessions: SessionService,
    identity: IdentitySynchronizer,
    validator: Option<Arc<TokenValidator>>,
    bootstrap_fallback: bool,
}

impl Authenticator {
    /// `validator` is `Some` exactly when federation is enabled.
    /// `bootstrap_fallback` must already account for federation-only mode.
    pub fn new(
        sessions: SessionService,
        identity: IdentitySynchronizer,
        validator: Option<Arc<TokenValidator>>,
        bootstrap_fallback: bool,
    ) -> Self {
        Self {
            sessions,
            identity,
            validator,
            bootstrap_fallback,
        }
    }

    pub async fn authenticate(&self, creds: &RequestCredentials<'_>) -> Result<Identity, ServiceError> {
        for strategy in PIPELINE {
            match self.run(strategy, creds).await {
                AuthOutcome::Authenticated(identity) => return Ok(identity),
                AuthOutcome::Skip => continue,
                AuthOutcome::Fail(err) => return Err(err),
            }
        }
        Err(ServiceError::Unauthenticated)
    }

    async fn run(&self, strategy: Strategy, creds: &RequestCredentials<'_>) -> AuthOutcome {
        match strategy {
            Strategy::Attached => match creds.attached {
                Some(identity) => AuthOutcome::Authenticated(identity.clone()),
                None => AuthOutcome::Skip,
            },
            Strategy::Federated => self.federated(creds).await,
            Strategy::Session => self.session(creds).await,
            Strategy::Bootstrap => self.bootstrap(creds).await,
        }
    }

    async fn federated(&self, creds: &RequestCredentials<'_>) -> AuthOutcome {
        let (Some(validator), Some(token)) = (&self.validator, creds.federated_token()) else {
            return AuthOutcome::Skip;
        };

        let claims = match validator.validate(token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::info!(reason = %e, "Federated token rejected, trying session token");
                return AuthOutcome::Skip;
            }
        };

        match self.identity.sync(&claims).await {
            Ok(user) => AuthOutcome::Authenticated(Identity {
                user,
                credential: CredentialKind::FederatedToken,
            }),
            Err(e) if is_fatal(&e) => AuthOutcome::Fail(e),
            Err(e) => {
                tracing::info!(reason = %e, "Federated identity could not be synced");
                AuthOutcome::Skip
            }
        }
    }

    async fn session(&self, creds: &RequestCredentials<'_>) -> AuthOutcome {
        let Some(token) = creds.session_token() else {
            return AuthOutcome::Skip;
        };

        match self.sessions.authenticate(token).await {
            Ok(user) => AuthOutcome::Authenticated(Identity {
                user,
                credential: CredentialKind::Session,
            }),
            Err(ServiceError::Unauthenticated) => AuthOutcome::Skip,
            Err(e) => AuthOutcome::Fail(e),
        }
    }

    async fn bootstrap(&self, creds: &RequestCredentials<'_>) -> AuthOutcome {
        if !self.bootstrap_fallback {
            return AuthOutcome::Skip;
        }
        match self.identity.bootstrap_admin().await {
            Ok(user) => {
                tracing::warn!(
                    path = creds.path,
                    user_id = user.id,
                    "Break-glass: request resolved to the bootstrap administrator"
                );
                AuthOutcome::Authenticated(Identity {
                    user,
                    credential: CredentialKind::Bootstrap,
                })
            }
            Err(e) => AuthOutcome::Fail(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthMethod, GlobalRole, NewUser, Session};
    use crate::services::{AuthStore, InMemoryStore};
    use chrono::{Duration, Utc};

    async fn setup(bootstrap: bool) -> (Arc<InMemoryStore>, Authenticator, User) {
        let store = Arc::new(InMemoryStore::new());
        let user = store
            .create_user(NewUser {
                username: "alice".to_string(),
                password_hash: None,
                email: String::new(),
                role: GlobalRole::Member,
                auth_method: AuthMethod::Local,
            })
            .await
            .unwrap();
        let authenticator = Authenticator::new(
            SessionService::new(store.clone(), 1),
            IdentitySynchronizer::new(store.clone()),
            None,
            bootstrap,
        );
        (store, authenticator, user)
    }

    #[tokio::test]
    async fn test_attached_identity_wins() {
        let (_store, auth, user) = setup(false).await;
        let attached = Identity {
            user: user.clone(),
            credential: CredentialKind::Attached,
        };
        let creds = RequestCredentials {
            attached: Some(&attached),
            authorization: Some("garbage"),
            ..Default::default()
        };
        let identity = auth.authenticate(&creds).await.unwrap();
        assert_eq!(identity.credential, CredentialKind::Attached);
        assert_eq!(identity.user.id, user.id);
    }

    #[tokio::test]
    async fn test_raw_header_is_session_token() {
        let (store, auth, user) = setup(false).await;
        store
            .create_session(&Session::new("tok123".to_string(), user.id, Utc::now() + Duration::hours(1)))
            .await
            .unwrap();
        let creds = RequestCredentials {
            authorization: Some("tok123"),
            ..Default::default()
        };
        let identity = auth.authenticate(&creds).await.unwrap();
        assert_eq!(identity.credential, CredentialKind::Session);
    }

    #[tokio::test]
    async fn test_empty_and_bare_bearer_headers_are_unauthenticated() {
        let (_store, auth, _user) = setup(false).await;
        for header in ["", "   ", "Bearer ", "Bearer", "unknown-token"] {
            let creds = RequestCredentials {
                authorization: Some(header),
                ..Default::default()
            };
            assert!(matches!(
                auth.authenticate(&creds).await,
                Err(ServiceError::Unauthenticated)
            ));
        }
        assert!(matches!(
            auth.authenticate(&RequestCredentials::default()).await,
            Err(ServiceError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_expired_session_is_terminal() {
        let (store, auth, user) = setup(true).await;
        store
            .create_session(&Session::new("old".to_string(), user.id, Utc::now() - Duration::hours(1)))
            .await
            .unwrap();
        let creds = RequestCredentials {
            authorization: Some("old"),
            ..Default::default()
        };
        assert!(matches!(
            auth.authenticate(&creds).await,
            Err(ServiceError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_fallback_only_when_enabled() {
        let (_store, off, _user) = setup(false).await;
        assert!(off.authenticate(&RequestCredentials::default()).await.is_err());

        let (_store, on, _user) = setup(true).await;
        let identity = on.authenticate(&RequestCredentials::default()).await.unwrap();
        assert_eq!(identity.credential, CredentialKind::Bootstrap);
        assert_eq!(identity.user.role, GlobalRole::GlobalAdmin);
    }

    #[test]
    fn test_federated_token_sources() {
        let creds = RequestCredentials {
            authorization: Some("Bearer abc"),
            token_cookie: Some("cookie-token"),
            ..Default::default()
        };
        assert_eq!(creds.federated_token(), Some("abc"));

        let cookie_only = RequestCredentials {
            authorization: Some("raw-session"),
            token_cookie: Some("cookie-token"),
            ..Default::default()
        };
        assert_eq!(cookie_only.federated_token(), Some("cookie-token"));
        assert_eq!(cookie_only.session_token(), Some("raw-session"));
    }
}
