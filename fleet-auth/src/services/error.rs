use service_core::error::AppError;
use thiserror::Error;

use super::store::StoreError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Keycloak authentication required")]
    FederationRequired,

    #[error("Local registration is disabled while Keycloak authentication is enforced")]
    LocalRegistrationDisabled,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Session expired")]
    SessionExpired,

    #[error("Authorization header is required")]
    MissingToken,

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("Username already taken")]
    UsernameTaken,

    #[error("User not found")]
    UserNotFound,

    #[error("Domain not found")]
    DomainNotFound,

    #[error("Password must not exceed 72 bytes")]
    PasswordTooLong,

    #[error("Identity token carries neither preferred_username nor email")]
    MissingUsername,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Store(e) => e.into(),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials => AppError::AuthError(anyhow::anyhow!("Invalid credentials")),
            ServiceError::FederationRequired => {
                AppError::AuthError(anyhow::anyhow!("Keycloak authentication required"))
            }
            ServiceError::LocalRegistrationDisabled => AppError::Unauthorized(anyhow::anyhow!(
                "Local registration is disabled while Keycloak authentication is enforced"
            )),
            ServiceError::Unauthenticated => AppError::Unauthorized(anyhow::anyhow!("Authentication required")),
            ServiceError::SessionExpired => AppError::Unauthorized(anyhow::anyhow!("Session expired")),
            ServiceError::MissingToken => AppError::BadRequest(anyhow::anyhow!("Authorization header is required")),
            ServiceError::UserAlreadyExists => AppError::Conflict(anyhow::anyhow!("User already exists")),
            ServiceError::UsernameTaken => AppError::Conflict(anyhow::anyhow!("Username already taken")),
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            ServiceError::DomainNotFound => AppError::NotFound(anyhow::anyhow!("Domain not found")),
            ServiceError::PasswordTooLong => AppError::BadRequest(anyhow::anyhow!("Password must not exceed 72 bytes")),
            ServiceError::MissingUsername => AppError::AuthError(anyhow::anyhow!("Invalid identity token")),
            ServiceError::Forbidden(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            ServiceError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
        }
    }
}

impl From<crate::utils::PasswordError> for ServiceError {
    fn from(err: crate::utils::PasswordError) -> Self {
        match err {
            crate::utils::PasswordError::TooLong => ServiceError::PasswordTooLong,
            crate::utils::PasswordError::Hash(e) => ServiceError::Internal(anyhow::Error::new(e)),
        }
    }
}
