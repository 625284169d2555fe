pub mod auth;
pub mod domains;
pub mod health;
pub mod metrics;
pub mod user;

pub use auth::{login, logout, register, sso_callback, sso_login, sso_logout};
