//! Reconciles verified provider identities into local user records.

use std::sync::Arc;

use crate::models::{AuthMethod, GlobalRole, NewUser, User};

use super::error::ServiceError;
use super::store::{AuthStore, StoreError};
use super::token_validator::FederatedClaims;

/// Username of the account used by the break-glass fallback.
pub const BOOTSTRAP_ADMIN_USERNAME: &str = "admin";

/// Highest realm role wins. Anything unrecognised is a plain member, so a role
/// withdrawn at the provider is withdrawn locally on the next sync.
pub fn map_realm_roles(roles: &[String]) -> GlobalRole {
    if roles.iter().any(|r| r == "global_admin") {
        GlobalRole::GlobalAdmin
    } else if roles.iter().any(|r| r == "admin") {
        GlobalRole::Admin
    } else {
        GlobalRole::Member
    }
}

/// `preferred_username`, else the local part of the email address.
pub fn resolve_username(claims: &FederatedClaims) -> Option<String> {
    claims
        .preferred_username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .or_else(|| {
            claims
                .email
                .as_deref()
                .and_then(|email| email.split('@').next())
                .map(str::trim)
                .filter(|u| !u.is_empty())
        })
        .map(str::to_string)
}

#[derive(Clone)]
pub struct IdentitySynchronizer {
    store: Arc<dyn AuthStore>,
}

impl IdentitySynchronizer {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    /// Create or update the local user matching `claims`.
    pub async fn sync(&self, claims: &FederatedClaims) -> Result<User, ServiceError> {
        let username = resolve_username(claims).ok_or(ServiceError::MissingUsername)?;
        let role = map_realm_roles(claims.roles());

        let existing = match self.store.find_user_by_username(&username).await? {
            Some(user) => user,
            None => {
                let created = self
                    .store
                    .create_user(NewUser {
                        username: username.clone(),
                        password_hash: None,
                        email: claims.email.clone().unwrap_or_default(),
                        role,
                        auth_method: AuthMethod::Federated,
                    })
                    .await;
                match created {
                    Ok(user) => {
                        tracing::info!(user_id = user.id, username = %user.username, "Federated user created");
                        return Ok(user);
                    }
                    // Another request created the same account first.
                    Err(StoreError::Conflict(_)) => self
                        .store
                        .find_user_by_username(&username)
                        .await?
                        .ok_or(ServiceError::UserNotFound)?,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let mut updated = existing.clone();
        if let Some(email) = &claims.email {
            updated.email = email.clone();
        }
        updated.role = role;

        if updated == existing {
            return Ok(existing);
        }

        if existing.role != role {
            tracing::info!(
                user_id = existing.id,
                from = existing.role.as_str(),
                to = role.as_str(),
                "Federated role changed"
            );
        }
        Ok(self.store.update_user(&updated).await?)
    }

    /// Load or create the bootstrap administrator used by the break-glass fallback.
    pub async fn bootstrap_admin(&self) -> Result<User, ServiceError> {
        if let Some(user) = self.store.find_user_by_username(BOOTSTRAP_ADMIN_USERNAME).await? {
            return Self::require_global_admin(user);
        }
        let created = self
            .store
            .create_user(NewUser {
                username: BOOTSTRAP_ADMIN_USERNAME.to_string(),
                password_hash: None,
                email: String::new(),
                role: GlobalRole::GlobalAdmin,
                auth_method: AuthMethod::Federated,
            })
            .await;
        match created {
            Ok(user) => {
                tracing::warn!(user_id = user.id, "Bootstrap administrator account created");
                Ok(user)
            }
            Err(StoreError::Conflict(_)) => self
                .store
                .find_user_by_username(BOOTSTRAP_ADMIN_USERNAME)
                .await?
                .ok_or(ServiceError::UserNotFound)
                .and_then(Self::require_global_admin),
            Err(e) => Err(e.into()),
        }
    }

    /// An `admin` account that lost global admin must not be reused for break-glass access.
    fn require_global_admin(user: User) -> Result<User, ServiceError> {
        if user.role.is_global_admin() {
            return Ok(user);
        }
        tracing::error!(
            user_id = user.id,
            role = user.role.as_str(),
            "Break-glass refused: bootstrap account is not a global admin"
        );
        Err(ServiceError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::token_validator::RealmAccess;
    use crate::services::InMemoryStore;

    fn claims(username: Option<&str>, email: Option<&str>, roles: &[&str]) -> FederatedClaims {
        FederatedClaims {
            sub: "sub-1".to_string(),
            preferred_username: username.map(str::to_string),
            email: email.map(str::to_string),
            realm_access: RealmAccess {
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
            iss: "https://sso.example.com/realms/fleet".to_string(),
            exp: 0,
            nbf: None,
        }
    }

    #[test]
    fn test_role_precedence() {
        let roles = |r: &[&str]| r.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(map_realm_roles(&roles(&["admin", "global_admin"])), GlobalRole::GlobalAdmin);
        assert_eq!(map_realm_roles(&roles(&["offline_access", "admin"])), GlobalRole::Admin);
        assert_eq!(map_realm_roles(&roles(&["uma_authorization"])), GlobalRole::Member);
        assert_eq!(map_realm_roles(&[]), GlobalRole::Member);
    }

    #[test]
    fn test_username_falls_back_to_email_local_part() {
        assert_eq!(
            resolve_username(&claims(Some("jdoe"), Some("x@y.z"), &[])).as_deref(),
            Some("jdoe")
        );
        assert_eq!(
            resolve_username(&claims(None, Some("jane.doe@example.com"), &[])).as_deref(),
            Some("jane.doe")
        );
        assert_eq!(
            resolve_username(&claims(Some(""), Some("jane@example.com"), &[])).as_deref(),
            Some("jane")
        );
        assert_eq!(resolve_username(&claims(None, None, &[])), None);
        assert_eq!(resolve_username(&claims(None, Some("@example.com"), &[])), None);
    }

    #[tokio::test]
    async fn test_sync_creates_then_updates() {
        let store = Arc::new(InMemoryStore::new());
        let sync = IdentitySynchronizer::new(store.clone());

        let created = sync
            .sync(&claims(Some("jdoe"), Some("old@example.com"), &["global_admin"]))
            .await
            .unwrap();
        assert_eq!(created.auth_method, AuthMethod::Federated);
        assert_eq!(created.role, GlobalRole::GlobalAdmin);
        assert!(created.password_hash.is_none());

        let downgraded = sync
            .sync(&claims(Some("jdoe"), Some("new@example.com"), &[]))
            .await
            .unwrap();
        assert_eq!(downgraded.id, created.id);
        assert_eq!(downgraded.email, "new@example.com");
        assert_eq!(downgraded.role, GlobalRole::Member);
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sync_keeps_local_password_and_method() {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_user(NewUser {
                username: "jdoe".to_string(),
                password_hash: Some("$2b$04$hash".to_string()),
                email: "jdoe@example.com".to_string(),
                role: GlobalRole::Admin,
                auth_method: AuthMethod::Local,
            })
            .await
            .unwrap();

        let sync = IdentitySynchronizer::new(store);
        let user = sync.sync(&claims(Some("jdoe"), None, &["admin"])).await.unwrap();
        assert_eq!(user.auth_method, AuthMethod::Local);
        assert_eq!(user.password_hash.as_deref(), Some("$2b$04$hash"));
        assert_eq!(user.email, "jdoe@example.com");
    }

    #[tokio::test]
    async fn test_sync_without_username_fails() {
        let sync = IdentitySynchronizer::new(Arc::new(InMemoryStore::new()));
        assert!(matches!(
            sync.sync(&claims(None, None, &[])).await,
            Err(ServiceError::MissingUsername)
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_admin_is_reused() {
        let sync = IdentitySynchronizer::new(Arc::new(InMemoryStore::new()));
        let first = sync.bootstrap_admin().await.unwrap();
        let second = sync.bootstrap_admin().await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.role, GlobalRole::GlobalAdmin);
    }

    #[tokio::test]
    async fn test_bootstrap_refuses_downgraded_admin_account() {
        let store = Arc::new(InMemoryStore::new());
        let sync = IdentitySynchronizer::new(store.clone());
        // A federated `admin` whose realm roles were withdrawn.
        let demoted = sync.sync(&claims(Some("admin"), None, &[])).await.unwrap();
        assert_eq!(demoted.role, GlobalRole::Member);

        assert!(matches!(
            sync.bootstrap_admin().await,
            Err(ServiceError::Unauthenticated)
        ));
        assert_eq!(store.count_users().await.unwrap(), 1);
    }
}
