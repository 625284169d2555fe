pub mod auth;
pub mod domain;

pub use auth::{auth_middleware, optional_auth_middleware, AuthUser};
pub use domain::{domain_access_middleware, domain_admin_middleware, domain_scope_middleware};
pub use crate::services::DomainContext;
