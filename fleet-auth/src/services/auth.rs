//! Local credentials: login, registration and self-service profile changes.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    dtos::auth::{RegisterRequest, UpdateMeRequest},
    models::{AuthMethod, GlobalRole, NewUser, Session, User},
    utils::{hash_password, verify_password, Password},
};

use super::{
    error::ServiceError,
    metrics::record_login,
    session::SessionService,
    store::{AuthStore, StoreError},
};

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    sessions: SessionService,
    bcrypt_cost: u32,
    federation_only: bool,
    /// Held from the first-account check until the user row exists.
    registration: Arc<Mutex<()>>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        sessions: SessionService,
        bcrypt_cost: u32,
        federation_only: bool,
    ) -> Self {
        Self {
            store,
            sessions,
            bcrypt_cost,
            federation_only,
            registration: Arc::new(Mutex::new(())),
        }
    }

    /// bcrypt is CPU-bound; keep it off the async workers.
    async fn hash(&self, password: String) -> Result<String, ServiceError> {
        let cost = self.bcrypt_cost;
        let hash = tokio::task::spawn_blocking(move || hash_password(&Password::new(password), cost))
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Password hashing task failed: {}", e)))??;
        Ok(hash.into_string())
    }

    async fn verify(&self, password: String, hash: String) -> Result<bool, ServiceError> {
        tokio::task::spawn_blocking(move || verify_password(&Password::new(password), &hash))
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Password verification task failed: {}", e)))
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(Session, User), ServiceError> {
        let user = match self.store.find_user_by_username(username).await? {
            Some(user) => user,
            None => {
                record_login("unknown_user");
                tracing::info!(username, "Login failed: unknown user");
                return Err(ServiceError::InvalidCredentials);
            }
        };

        if self.federation_only && user.auth_method == AuthMethod::Local {
            record_login("federation_required");
            tracing::info!(user_id = user.id, "Login refused: local login disabled for local accounts");
            return Err(ServiceError::FederationRequired);
        }

        let Some(hash) = user.password_hash.clone() else {
            record_login("no_password");
            tracing::info!(user_id = user.id, "Login failed: account has no local password");
            return Err(ServiceError::InvalidCredentials);
        };

        if !self.verify(password.to_string(), hash).await? {
            record_login("bad_password");
            tracing::info!(user_id = user.id, "Login failed: bad password");
            return Err(ServiceError::InvalidCredentials);
        }

        let session = self.sessions.issue(&user).await?;
        record_login("success");
        tracing::info!(user_id = user.id, username = %user.username, "User logged in");
        Ok((session, user))
    }

    /// Create an account. The very first account is open registration and becomes
    /// the global administrator; afterwards `caller` must be able to manage users.
    pub async fn register(&self, caller: Option<&User>, req: RegisterRequest) -> Result<User, ServiceError> {
        if self.federation_only {
            return Err(ServiceError::LocalRegistrationDisabled);
        }

        let _registration = self.registration.lock().await;
        let bootstrap = self.store.count_users().await? == 0;
        let role = if bootstrap {
            GlobalRole::GlobalAdmin
        } else {
            let caller = caller.ok_or(ServiceError::Unauthenticated)?;
            if !caller.role.can_manage_users() {
                return Err(ServiceError::Forbidden("Admin privileges required".to_string()));
            }
            let requested = req.role.unwrap_or_default();
            if requested == GlobalRole::GlobalAdmin && !caller.role.is_global_admin() {
                return Err(ServiceError::Forbidden(
                    "Only a global admin may grant global_admin".to_string(),
                ));
            }
            requested
        };

        for group in &req.groups {
            if self.store.find_domain(group.domain_id).await?.is_none() {
                return Err(ServiceError::DomainNotFound);
            }
        }

        let password_hash = self.hash(req.password).await?;
        let user = self
            .store
            .create_user(NewUser {
                username: req.username,
                password_hash: Some(password_hash),
                email: req.email.unwrap_or_default(),
                role,
                auth_method: AuthMethod::Local,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => ServiceError::UserAlreadyExists,
                other => other.into(),
            })?;

        for group in &req.groups {
            self.store
                .upsert_domain_user(user.id, group.domain_id, group.role)
                .await?;
        }

        tracing::info!(
            user_id = user.id,
            username = %user.username,
            role = user.role.as_str(),
            bootstrap,
            "User registered"
        );
        Ok(user)
    }

    pub async fn update_profile(&self, user: &User, req: UpdateMeRequest) -> Result<User, ServiceError> {
        let mut updated = user.clone();

        if let Some(username) = req.username {
            if username != user.username {
                if let Some(other) = self.store.find_user_by_username(&username).await? {
                    if other.id != user.id {
                        return Err(ServiceError::UsernameTaken);
                    }
                }
                updated.username = username;
            }
        }

        if let Some(email) = req.email {
            updated.email = email;
        }

        if let Some(password) = req.password {
            if user.auth_method != AuthMethod::Local {
                return Err(ServiceError::Validation(
                    "Password cannot be changed for federated accounts".to_string(),
                ));
            }
            updated.password_hash = Some(self.hash(password).await?);
        }

        let stored = self.store.update_user(&updated).await.map_err(|e| match e {
            StoreError::Conflict(_) => ServiceError::UsernameTaken,
            other => other.into(),
        })?;
        tracing::info!(user_id = stored.id, "Profile updated");
        Ok(stored)
    }

    pub async fn delete_account(&self, user: &User) -> Result<(), ServiceError> {
        if !self.store.delete_user(user.id).await? {
            return Err(ServiceError::UserNotFound);
        }
        tracing::info!(user_id = user.id, username = %user.username, "Account deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtos::auth::GroupMembership;
    use crate::models::{DomainRole, NewDomain};
    use crate::services::InMemoryStore;

    fn service(store: Arc<InMemoryStore>, federation_only: bool) -> AuthService {
        let sessions = SessionService::new(store.clone(), 1);
        AuthService::new(store, sessions, 4, federation_only)
    }

    fn register_req(username: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            password: "password123".to_string(),
            email: Some(format!("{}@example.com", username)),
            role: None,
            groups: vec![],
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_registrations_yield_one_global_admin() {
        let store = Arc::new(InMemoryStore::new());
        let auth = service(store.clone(), false);

        let (first, second) = tokio::join!(
            auth.register(None, register_req("racer1")),
            auth.register(None, register_req("racer2"))
        );
        let admins = [&first, &second]
            .iter()
            .filter(|r| matches!(r, Ok(user) if user.role == GlobalRole::GlobalAdmin))
            .count();
        assert_eq!(admins, 1);
        assert!(matches!(
            [first, second].into_iter().find(|r| r.is_err()),
            Some(Err(ServiceError::Unauthenticated))
        ));
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_first_user_bootstraps_global_admin() {
        let store = Arc::new(InMemoryStore::new());
        let auth = service(store, false);
        let admin = auth.register(None, register_req("root")).await.unwrap();
        assert_eq!(admin.role, GlobalRole::GlobalAdmin);
        assert_eq!(admin.auth_method, AuthMethod::Local);
        assert!(admin.password_hash.as_deref().unwrap().starts_with("$2"));
    }

    #[tokio::test]
    async fn test_later_registration_requires_admin() {
        let store = Arc::new(InMemoryStore::new());
        let auth = service(store, false);
        let admin = auth.register(None, register_req("root")).await.unwrap();

        assert!(matches!(
            auth.register(None, register_req("u1x")).await,
            Err(ServiceError::Unauthenticated)
        ));

        let member = auth.register(Some(&admin), register_req("u1x")).await.unwrap();
        assert_eq!(member.role, GlobalRole::Member);

        assert!(matches!(
            auth.register(Some(&member), register_req("u2x")).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_only_global_admin_grants_global_admin() {
        let store = Arc::new(InMemoryStore::new());
        let auth = service(store, false);
        let root = auth.register(None, register_req("root")).await.unwrap();
        let mut req = register_req("ops");
        req.role = Some(GlobalRole::Admin);
        let ops = auth.register(Some(&root), req).await.unwrap();

        let mut escalate = register_req("sneaky");
        escalate.role = Some(GlobalRole::GlobalAdmin);
        assert!(matches!(
            auth.register(Some(&ops), escalate).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_username_is_conflict() {
        let store = Arc::new(InMemoryStore::new());
        let auth = service(store, false);
        let root = auth.register(None, register_req("root")).await.unwrap();
        assert!(matches!(
            auth.register(Some(&root), register_req("root")).await,
            Err(ServiceError::UserAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn test_groups_create_memberships() {
        let store = Arc::new(InMemoryStore::new());
        let auth = service(store.clone(), false);
        let root = auth.register(None, register_req("root")).await.unwrap();
        let domain = store
            .create_domain(NewDomain {
                name: "acme".to_string(),
                active: true,
                settings: serde_json::json!({}),
            })
            .await
            .unwrap();

        let mut req = register_req("u1x");
        req.groups = vec![GroupMembership {
            domain_id: domain.id,
            role: DomainRole::DomainAdmin,
        }];
        let user = auth.register(Some(&root), req).await.unwrap();
        let rows = store.list_domain_users(user.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].role, DomainRole::DomainAdmin);

        let mut missing = register_req("u2x");
        missing.groups = vec![GroupMembership {
            domain_id: 9999,
            role: DomainRole::DomainUser,
        }];
        assert!(matches!(
            auth.register(Some(&root), missing).await,
            Err(ServiceError::DomainNotFound)
        ));
    }

    #[tokio::test]
    async fn test_login_checks_password() {
        let store = Arc::new(InMemoryStore::new());
        let auth = service(store, false);
        auth.register(None, register_req("root")).await.unwrap();

        let (session, user) = auth.login("root", "password123").await.unwrap();
        assert_eq!(user.username, "root");
        assert!(!session.token.is_empty());

        assert!(matches!(
            auth.login("root", "wrong-password").await,
            Err(ServiceError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("ghost", "password123").await,
            Err(ServiceError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_federation_only_blocks_local_accounts() {
        let store = Arc::new(InMemoryStore::new());
        let hash = hash_password(&Password::new("password123".to_string()), 4)
            .unwrap()
            .into_string();
        for (username, method) in [("local1", AuthMethod::Local), ("fed1", AuthMethod::Federated)] {
            store
                .create_user(NewUser {
                    username: username.to_string(),
                    password_hash: Some(hash.clone()),
                    email: String::new(),
                    role: GlobalRole::Member,
                    auth_method: method,
                })
                .await
                .unwrap();
        }

        let auth = service(store, true);
        assert!(matches!(
            auth.login("local1", "password123").await,
            Err(ServiceError::FederationRequired)
        ));
        assert!(auth.login("fed1", "password123").await.is_ok());
        assert!(matches!(
            auth.register(None, register_req("new1")).await,
            Err(ServiceError::LocalRegistrationDisabled)
        ));
    }

    #[tokio::test]
    async fn test_update_profile_rejects_taken_username() {
        let store = Arc::new(InMemoryStore::new());
        let auth = service(store, false);
        let root = auth.register(None, register_req("root")).await.unwrap();
        let u1 = auth.register(Some(&root), register_req("u1x")).await.unwrap();

        let clash = UpdateMeRequest {
            username: Some("root".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            auth.update_profile(&u1, clash).await,
            Err(ServiceError::UsernameTaken)
        ));

        let rename = UpdateMeRequest {
            username: Some("u1-renamed".to_string()),
            password: Some("new-password".to_string()),
            ..Default::default()
        };
        let updated = auth.update_profile(&u1, rename).await.unwrap();
        assert_eq!(updated.username, "u1-renamed");
        assert_eq!(updated.email, "u1x@example.com");
        assert!(auth.login("u1-renamed", "new-password").await.is_ok());
    }
}
