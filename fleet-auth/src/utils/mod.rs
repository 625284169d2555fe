pub mod password;
pub mod token;
pub mod validation;

pub use password::{hash_password, verify_password, Password, PasswordError, PasswordHashString};
pub use token::{generate_random_token, generate_state, TOKEN_CHARSET};
pub use validation::ValidatedJson;
