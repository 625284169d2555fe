//! Computes which domains an authenticated caller may act on.

use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

use crate::models::{DomainId, DomainRole, DomainUser, User};

use super::scope::DomainScope;
use super::store::{AuthStore, StoreError};

#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Invalid domain ID")]
    InvalidDomainId,

    #[error("Domain not found")]
    DomainNotFound,

    #[error("Access denied to this domain")]
    AccessDenied,

    #[error("User has no domain access")]
    NoDomainAccess,

    #[error("Domain ID is required")]
    DomainIdRequired,

    #[error("Domain admin privileges required")]
    AdminRequired,

    #[error("Global admin privileges required")]
    GlobalAdminRequired,

    #[error("Failed to load domain access: {0}")]
    Store(#[from] StoreError),
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::InvalidDomainId | AccessError::DomainIdRequired => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            AccessError::DomainNotFound => AppError::NotFound(anyhow::anyhow!(err.to_string())),
            AccessError::AccessDenied
            | AccessError::NoDomainAccess
            | AccessError::AdminRequired
            | AccessError::GlobalAdminRequired => AppError::Forbidden(anyhow::anyhow!(err.to_string())),
            AccessError::Store(e) => AppError::InternalError(anyhow::anyhow!(e)),
        }
    }
}

/// Domain ids are positive integers that fit a signed 64-bit column.
pub fn parse_domain_id(raw: &str) -> Result<DomainId, AccessError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AccessError::InvalidDomainId);
    }
    raw.parse::<u64>()
        .ok()
        .and_then(|id| DomainId::try_from(id).ok())
        .ok_or(AccessError::InvalidDomainId)
}

/// Resolved domain access for one request.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DomainContext {
    pub is_global_admin: bool,
    pub user_domains: Vec<DomainUser>,
    pub requested_domain_id: Option<DomainId>,
}

impl DomainContext {
    pub fn scope(&self) -> DomainScope {
        DomainScope::from_context(self)
    }

    pub fn role_in(&self, domain_id: DomainId) -> Option<DomainRole> {
        self.user_domains
            .iter()
            .find(|du| du.domain_id == domain_id)
            .map(|du| du.role)
    }

    pub fn require_domain_id(&self) -> Result<DomainId, AccessError> {
        self.requested_domain_id.ok_or(AccessError::DomainIdRequired)
    }
}

#[derive(Clone)]
pub struct DomainAccessResolver {
    store: Arc<dyn AuthStore>,
}

impl DomainAccessResolver {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    async fn build(
        &self,
        user: &User,
        raw_domain_id: Option<&str>,
        require_membership: bool,
    ) -> Result<DomainContext, AccessError> {
        let requested_domain_id = raw_domain_id.map(parse_domain_id).transpose()?;

        if user.role.is_global_admin() {
            if let Some(id) = requested_domain_id {
                if self.store.find_domain(id).await?.is_none() {
                    return Err(AccessError::DomainNotFound);
                }
            }
            return Ok(DomainContext {
                is_global_admin: true,
                user_domains: Vec::new(),
                requested_domain_id,
            });
        }

        let user_domains = self.store.list_domain_users(user.id).await.map_err(|e| {
            tracing::error!(user_id = user.id, error = %e, "Failed to load domain memberships");
            AccessError::Store(e)
        })?;

        match requested_domain_id {
            Some(id) if !user_domains.iter().any(|du| du.domain_id == id) => {
                tracing::info!(user_id = user.id, domain_id = id, "Domain access denied");
                return Err(AccessError::AccessDenied);
            }
            None if require_membership && user_domains.is_empty() => {
                return Err(AccessError::NoDomainAccess);
            }
            _ => {}
        }

        Ok(DomainContext {
            is_global_admin: false,
            user_domains,
            requested_domain_id,
        })
    }

    /// Strict resolution for domain-scoped routes.
    pub async fn resolve(&self, user: &User, raw_domain_id: Option<&str>) -> Result<DomainContext, AccessError> {
        self.build(user, raw_domain_id, true).await
    }

    /// Resolution for listing routes: a caller without memberships gets an empty
    /// scope instead of a rejection.
    pub async fn resolve_scope(&self, user: &User) -> Result<DomainContext, AccessError> {
        self.build(user, None, false).await
    }

    /// Global admins always pass; everyone else needs `domain_admin` on the
    /// requested domain.
    pub async fn require_domain_admin(
        &self,
        user: &User,
        raw_domain_id: Option<&str>,
    ) -> Result<DomainContext, AccessError> {
        let ctx = self.resolve(user, raw_domain_id).await?;
        if ctx.is_global_admin {
            return Ok(ctx);
        }
        let domain_id = ctx.require_domain_id()?;
        match ctx.role_in(domain_id) {
            Some(DomainRole::DomainAdmin) => Ok(ctx),
            _ => Err(AccessError::AdminRequired),
        }
    }

    pub fn require_global_admin(&self, user: &User) -> Result<(), AccessError> {
        if user.role.is_global_admin() {
            Ok(())
        } else {
            Err(AccessError::GlobalAdminRequired)
        }
    }
}
