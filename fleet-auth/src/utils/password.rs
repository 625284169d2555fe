/// bcrypt only reads the first 72 bytes of its input; longer secrets are refused
/// instead of being silently truncated.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for password hash
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password must not exceed {MAX_PASSWORD_BYTES} bytes")]
    TooLong,

    #[error("Failed to hash password: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

/// Hash a password with bcrypt at the given cost.
///
/// The empty string is a valid input. Salt is generated per call and embedded
/// in the returned hash.
pub fn hash_password(password: &Password, cost: u32) -> Result<PasswordHashString, PasswordError> {
    if password.as_str().len() > MAX_PASSWORD_BYTES {
        return Err(PasswordError::TooLong);
    }

    let hash = bcrypt::hash(password.as_str(), cost)?;
    Ok(PasswordHashString::new(hash))
}

/// Check a password against a stored bcrypt hash.
///
/// Never errors: an empty or malformed hash is simply a mismatch. Input over
/// [`MAX_PASSWORD_BYTES`] never matches, since bcrypt would compare only its prefix.
pub fn verify_password(password: &Password, password_hash: &str) -> bool {
    if password_hash.is_empty() || password.as_str().len() > MAX_PASSWORD_BYTES {
        return false;
    }
    bcrypt::verify(password.as_str(), password_hash).unwrap_or(false)
}
