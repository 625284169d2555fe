//! Services layer: credentials, sessions, federation and domain access.

mod auth;
mod authenticator;
mod database;
mod domain_access;
pub mod error;
pub mod federation;
mod identity;
pub mod keycloak;
mod memory;
pub mod metrics;
mod scope;
mod session;
mod store;
pub mod token_validator;

pub use auth::AuthService;
pub use authenticator::{AuthOutcome, Authenticator, CredentialKind, Identity, RequestCredentials};
pub use database::Database;
pub use domain_access::{parse_domain_id, AccessError, DomainAccessResolver, DomainContext};
pub use error::ServiceError;
pub use federation::{FederationController, FederationError};
pub use identity::{map_realm_roles, resolve_username, IdentitySynchronizer, BOOTSTRAP_ADMIN_USERNAME};
pub use keycloak::{IdentityProvider, KeycloakClient, ProviderError, TokenSet};
pub use memory::InMemoryStore;
pub use scope::DomainScope;
pub use session::{SessionService, SESSION_TOKEN_LENGTH};
pub use store::{AuthStore, StoreError};
pub use token_validator::{FederatedClaims, JwksCache, KeyResolver, RealmAccess, TokenError, TokenValidator};
