pub mod registration;
pub mod session;
pub mod sso;

pub use registration::register;
pub use session::{login, logout};
pub use sso::{sso_callback, sso_login, sso_logout};
