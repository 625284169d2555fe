//! Domain (tenant) and per-domain membership models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::UserId;

pub type DomainId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Domain {
    pub id: DomainId,
    pub name: String,
    pub active: bool,
    #[schema(value_type = Object)]
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDomain {
    pub name: String,
    pub active: bool,
    pub settings: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DomainRole {
    DomainUser,
    DomainAdmin,
}

impl DomainRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainRole::DomainUser => "domain_user",
            DomainRole::DomainAdmin => "domain_admin",
        }
    }
}

impl std::str::FromStr for DomainRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "domain_user" => Ok(DomainRole::DomainUser),
            "domain_admin" => Ok(DomainRole::DomainAdmin),
            other => Err(format!("Invalid domain role: {}", other)),
        }
    }
}

/// Membership of a user in a domain. `(user_id, domain_id)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DomainUser {
    pub id: i64,
    pub user_id: UserId,
    pub domain_id: DomainId,
    pub role: DomainRole,
}
