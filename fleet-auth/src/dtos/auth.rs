use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use crate::models::{DomainId, DomainRole, GlobalRole, UserResponse};

/// Usernames: 2 to 64 characters from `[A-Za-z0-9._-]`.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if !(2..=64).contains(&len) {
        return Err(ValidationError::new("username_length")
            .with_message("Username must be between 2 and 64 characters".into()));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(ValidationError::new("username_charset")
            .with_message("Username may only contain letters, digits, '.', '_' and '-'".into()));
    }
    Ok(())
}

/// Passwords for local accounts: 8 to 72 bytes (the bcrypt input limit).
pub fn validate_new_password(password: &str) -> Result<(), ValidationError> {
    if password.len() < 8 {
        return Err(ValidationError::new("password_length")
            .with_message("Password must be at least 8 characters".into()));
    }
    if password.len() > crate::utils::password::MAX_PASSWORD_BYTES {
        return Err(ValidationError::new("password_length")
            .with_message("Password must not exceed 72 bytes".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct GroupMembership {
    #[schema(example = 1)]
    pub domain_id: DomainId,
    pub role: DomainRole,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(custom(function = "validate_username"))]
    #[schema(example = "jdoe")]
    pub username: String,

    #[validate(custom(function = "validate_new_password"))]
    #[schema(example = "password123", min_length = 8)]
    pub password: String,

    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jdoe@example.com")]
    pub email: Option<String>,

    /// Account-wide role; defaults to the tenant-scoped member role.
    pub role: Option<GlobalRole>,

    /// Domain memberships created together with the account.
    #[serde(default)]
    pub groups: Vec<GroupMembership>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub user: UserResponse,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    #[schema(example = "jdoe")]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "password123")]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    /// Opaque session token; send it as the raw `Authorization` header value.
    #[schema(example = "q3N8cV0mZl2xR7tYp1aB9dE4fG6hJ0kL")]
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateMeRequest {
    #[validate(custom(function = "validate_username"))]
    pub username: Option<String>,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    #[validate(custom(function = "validate_new_password"))]
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SsoLoginQuery {
    /// Where to send the browser after a successful login.
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SsoCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}
