//! User model - accounts authenticated locally or through the identity provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type UserId = i64;

/// Account-wide role. Per-domain privileges live on `DomainUser`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum GlobalRole {
    /// Tenant-scoped account with no implicit privilege.
    #[default]
    #[serde(rename = "", alias = "user")]
    Member,
    /// Privileged but still tenant-scoped: may manage accounts, sees only its domains.
    #[serde(rename = "admin")]
    Admin,
    /// Unrestricted across every domain.
    #[serde(rename = "global_admin")]
    GlobalAdmin,
}

impl GlobalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalRole::Member => "",
            GlobalRole::Admin => "admin",
            GlobalRole::GlobalAdmin => "global_admin",
        }
    }

    pub fn is_global_admin(&self) -> bool {
        matches!(self, GlobalRole::GlobalAdmin)
    }

    /// Roles allowed to register other accounts.
    pub fn can_manage_users(&self) -> bool {
        matches!(self, GlobalRole::Admin | GlobalRole::GlobalAdmin)
    }
}

impl std::str::FromStr for GlobalRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "user" => Ok(GlobalRole::Member),
            "admin" => Ok(GlobalRole::Admin),
            "global_admin" => Ok(GlobalRole::GlobalAdmin),
            other => Err(format!("Invalid role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Local,
    Federated,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Local => "local",
            AuthMethod::Federated => "federated",
        }
    }
}

impl std::str::FromStr for AuthMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(AuthMethod::Local),
            "federated" => Ok(AuthMethod::Federated),
            other => Err(format!("Invalid auth method: {}", other)),
        }
    }
}

/// User entity.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// bcrypt hash; `None` for accounts that only ever sign in through the provider.
    pub password_hash: Option<String>,
    pub email: String,
    pub role: GlobalRole,
    pub auth_method: AuthMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self)
    }
}

/// Fields needed to insert a user; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: Option<String>,
    pub email: String,
    pub role: GlobalRole,
    pub auth_method: AuthMethod,
}

/// User response for API (without sensitive fields).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: GlobalRole,
    pub auth_method: AuthMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
            role: u.role,
            auth_method: u.auth_method,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}
