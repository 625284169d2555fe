//! Process-local [`AuthStore`] used by tests and `STORAGE=memory` dev runs.
//!
//! Enforces the same constraints as the Postgres schema: unique usernames,
//! domain names and session tokens, a unique `(user_id, domain_id)` pair, and
//! cascade of sessions and memberships on user deletion.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use crate::models::{Domain, DomainId, DomainRole, DomainUser, NewDomain, NewUser, Session, User, UserId};

use super::scope::DomainScope;
use super::store::{AuthStore, StoreError};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<UserId, User>,
    sessions: HashMap<String, Session>,
    domains: BTreeMap<DomainId, Domain>,
    domain_users: Vec<DomainUser>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn username_taken(&self, username: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.username == username && Some(u.id) != except)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStore for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn count_users(&self) -> Result<i64, StoreError> {
        Ok(self.tables.lock().await.users.len() as i64)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut t = self.tables.lock().await;
        if t.username_taken(&user.username, None) {
            return Err(StoreError::Conflict("users_username_key".to_string()));
        }
        let now = Utc::now();
        let id = t.next_id();
        let stored = User {
            id,
            username: user.username,
            password_hash: user.password_hash,
            email: user.email,
            role: user.role,
            auth_method: user.auth_method,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(id, stored.clone());
        Ok(stored)
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn update_user(&self, user: &User) -> Result<User, StoreError> {
        let mut t = self.tables.lock().await;
        if t.username_taken(&user.username, Some(user.id)) {
            return Err(StoreError::Conflict("users_username_key".to_string()));
        }
        let stored = t
            .users
            .get_mut(&user.id)
            .ok_or_else(|| StoreError::MissingReference(format!("user {}", user.id)))?;
        *stored = User {
            created_at: stored.created_at,
            updated_at: Utc::now(),
            ..user.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        let existed = t.users.remove(&id).is_some();
        t.sessions.retain(|_, s| s.user_id != id);
        t.domain_users.retain(|du| du.user_id != id);
        Ok(existed)
    }

    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        if !t.users.contains_key(&session.user_id) {
            return Err(StoreError::MissingReference(format!("user {}", session.user_id)));
        }
        if t.sessions.contains_key(&session.token) {
            return Err(StoreError::Conflict("sessions_token_key".to_string()));
        }
        t.sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn find_session(&self, token: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.tables.lock().await.sessions.get(token).cloned())
    }

    async fn delete_session(&self, token: &str) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.sessions.remove(token).is_some())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut t = self.tables.lock().await;
        let before = t.sessions.len();
        t.sessions.retain(|_, s| !s.is_expired_at(now));
        Ok((before - t.sessions.len()) as u64)
    }

    async fn create_domain(&self, domain: NewDomain) -> Result<Domain, StoreError> {
        let mut t = self.tables.lock().await;
        if t.domains.values().any(|d| d.name == domain.name) {
            return Err(StoreError::Conflict("domains_name_key".to_string()));
        }
        let id = t.next_id();
        let stored = Domain {
            id,
            name: domain.name,
            active: domain.active,
            settings: domain.settings,
            created_at: Utc::now(),
        };
        t.domains.insert(id, stored.clone());
        Ok(stored)
    }

    async fn find_domain(&self, id: DomainId) -> Result<Option<Domain>, StoreError> {
        Ok(self.tables.lock().await.domains.get(&id).cloned())
    }

    async fn list_domains(&self, scope: &DomainScope) -> Result<Vec<Domain>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .domains
            .values()
            .filter(|d| scope.permits(d.id))
            .cloned()
            .collect())
    }

    async fn update_domain_settings(
        &self,
        id: DomainId,
        settings: serde_json::Value,
    ) -> Result<Option<Domain>, StoreError> {
        let mut t = self.tables.lock().await;
        Ok(t.domains.get_mut(&id).map(|d| {
            d.settings = settings;
            d.clone()
        }))
    }

    async fn list_domain_users(&self, user_id: UserId) -> Result<Vec<DomainUser>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .domain_users
            .iter()
            .filter(|du| du.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_domain_user(
        &self,
        user_id: UserId,
        domain_id: DomainId,
        role: DomainRole,
    ) -> Result<DomainUser, StoreError> {
        let mut t = self.tables.lock().await;
        if !t.users.contains_key(&user_id) {
            return Err(StoreError::MissingReference(format!("user {}", user_id)));
        }
        if !t.domains.contains_key(&domain_id) {
            return Err(StoreError::MissingReference(format!("domain {}", domain_id)));
        }
        if let Some(existing) = t
            .domain_users
            .iter_mut()
            .find(|du| du.user_id == user_id && du.domain_id == domain_id)
        {
            existing.role = role;
            return Ok(existing.clone());
        }
        let membership = DomainUser {
            id: t.next_id(),
            user_id,
            domain_id,
            role,
        };
        t.domain_users.push(membership.clone());
        Ok(membership)
    }

    async fn delete_domain_user(&self, user_id: UserId, domain_id: DomainId) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        let before = t.domain_users.len();
        t.domain_users
            .retain(|du| !(du.user_id == user_id && du.domain_id == domain_id));
        Ok(t.domain_users.len() != before)
    }
}
