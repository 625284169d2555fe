//! Opaque session tokens issued by local login.

use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::models::{Session, User};
use crate::utils::generate_random_token;

use super::error::ServiceError;
use super::store::{AuthStore, StoreError};

pub const SESSION_TOKEN_LENGTH: usize = 32;
const MAX_ISSUE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn AuthStore>,
    ttl: Duration,
}

impl SessionService {
    pub fn new(store: Arc<dyn AuthStore>, ttl_hours: i64) -> Self {
        Self {
            store,
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Issue a fresh session for `user`. A token collision is retried with a new
    /// token a bounded number of times.
    pub async fn issue(&self, user: &User) -> Result<Session, ServiceError> {
        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let session = Session::new(
                generate_random_token(SESSION_TOKEN_LENGTH),
                user.id,
                Utc::now() + self.ttl,
            );
            match self.store.create_session(&session).await {
                Ok(()) => return Ok(session),
                Err(StoreError::Conflict(_)) => {
                    tracing::warn!(user_id = user.id, attempt, "Session token collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ServiceError::Internal(anyhow::anyhow!(
            "Could not issue a unique session token after {} attempts",
            MAX_ISSUE_ATTEMPTS
        )))
    }

    /// Resolve the owner of a session token. An expired session is deleted by the
    /// lookup that discovers it.
    pub async fn authenticate(&self, token: &str) -> Result<User, ServiceError> {
        let session = self
            .store
            .find_session(token)
            .await?
            .ok_or(ServiceError::Unauthenticated)?;

        if session.is_expired_at(Utc::now()) {
            self.store.delete_session(token).await?;
            tracing::info!(user_id = session.user_id, "Expired session removed");
            return Err(ServiceError::SessionExpired);
        }

        self.store
            .find_user_by_id(session.user_id)
            .await?
            .ok_or(ServiceError::Unauthenticated)
    }

    /// Delete the session for `token`. Unknown tokens are not an error.
    pub async fn revoke(&self, token: &str) -> Result<(), ServiceError> {
        if token.trim().is_empty() {
            return Err(ServiceError::MissingToken);
        }
        self.store.delete_session(token).await?;
        Ok(())
    }

    pub async fn sweep_expired(&self) -> Result<u64, ServiceError> {
        Ok(self.store.delete_expired_sessions(Utc::now()).await?)
    }
}
