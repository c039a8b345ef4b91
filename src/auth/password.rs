//! bcrypt password hashing.

pub use bcrypt::BcryptError;

pub fn hash_password(password: &str, cost: u32) -> Result<String, BcryptError> {
    bcrypt::hash(password.as_bytes(), cost)
}

/// `Ok(false)` on mismatch; `Err` when the stored hash is malformed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, BcryptError> {
    bcrypt::verify(password.as_bytes(), hash)
}

/// Whether a stored password cell already holds a bcrypt hash.
pub fn is_hashed(value: &str) -> bool {
    ["$2a$", "$2b$", "$2x$", "$2y$"]
        .iter()
        .any(|prefix| value.starts_with(prefix))
}
