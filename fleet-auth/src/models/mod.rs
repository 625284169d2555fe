pub mod domain;
pub mod session;
pub mod user;

pub use domain::{Domain, DomainId, DomainRole, DomainUser, NewDomain};
pub use session::Session;
pub use user::{AuthMethod, GlobalRole, NewUser, User, UserId, UserResponse};
