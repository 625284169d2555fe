use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{DomainRole, UserId};

fn default_active() -> bool {
    true
}

fn empty_settings() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateDomainRequest {
    #[validate(length(min = 1, max = 255, message = "Domain name must be between 1 and 255 characters"))]
    #[schema(example = "acme")]
    pub name: String,

    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default = "empty_settings")]
    #[schema(value_type = Object)]
    pub settings: serde_json::Value,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateSettingsRequest {
    #[schema(value_type = Object)]
    pub settings: serde_json::Value,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpsertMemberRequest {
    #[schema(example = 2)]
    pub user_id: UserId,
    pub role: DomainRole,
}
