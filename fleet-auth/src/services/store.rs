//! Persistence seam for users, sessions, domains and memberships.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use thiserror::Error;

use crate::models::{Domain, DomainId, DomainRole, DomainUser, NewDomain, NewUser, Session, User, UserId};

use super::scope::DomainScope;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A referenced row does not exist.
    #[error("Missing reference: {0}")]
    MissingReference(String),

    #[error("Backend failure: {0}")]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::Conflict(db.constraint().unwrap_or("unique").to_string());
            }
            if db.is_foreign_key_violation() {
                return StoreError::MissingReference(db.constraint().unwrap_or("foreign key").to_string());
            }
        }
        StoreError::Backend(anyhow::Error::new(err))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => AppError::Conflict(anyhow::anyhow!("Resource already exists")),
            StoreError::MissingReference(_) => AppError::NotFound(anyhow::anyhow!("Referenced resource not found")),
            StoreError::Backend(e) => AppError::DatabaseError(e),
        }
    }
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn count_users(&self) -> Result<i64, StoreError>;
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    /// Persist every mutable field of `user`; returns the stored row.
    async fn update_user(&self, user: &User) -> Result<User, StoreError>;
    /// Delete a user together with its sessions and memberships.
    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError>;

    async fn create_session(&self, session: &Session) -> Result<(), StoreError>;
    async fn find_session(&self, token: &str) -> Result<Option<Session>, StoreError>;
    async fn delete_session(&self, token: &str) -> Result<bool, StoreError>;
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn create_domain(&self, domain: NewDomain) -> Result<Domain, StoreError>;
    async fn find_domain(&self, id: DomainId) -> Result<Option<Domain>, StoreError>;
    async fn list_domains(&self, scope: &DomainScope) -> Result<Vec<Domain>, StoreError>;
    async fn update_domain_settings(
        &self,
        id: DomainId,
        settings: serde_json::Value,
    ) -> Result<Option<Domain>, StoreError>;

    async fn list_domain_users(&self, user_id: UserId) -> Result<Vec<DomainUser>, StoreError>;
    /// Insert or change the role of the `(user_id, domain_id)` membership.
    async fn upsert_domain_user(
        &self,
        user_id: UserId,
        domain_id: DomainId,
        role: DomainRole,
    ) -> Result<DomainUser, StoreError>;
    async fn delete_domain_user(&self, user_id: UserId, domain_id: DomainId) -> Result<bool, StoreError>;
}
