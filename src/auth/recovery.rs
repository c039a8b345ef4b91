//! Signed, time-limited password recovery tokens.
//!
//! A token is `payload.timestamp.signature`, each part URL-safe base64
//! without padding: the email, the issue time (big-endian unix seconds) and
//! an HMAC-SHA256 over `payload.timestamp`. The HMAC key is derived from the
//! server secret and a salt, so tokens cannot be replayed as anything else
//! signed with the same secret.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::hmac;
use thiserror::Error;

/// Salt separating recovery tokens from other uses of the secret.
pub const RECOVERY_SALT: &str = "salt-recovery";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecoveryError {
    #[error("This link has expired. Request a new one.")]
    Expired { age_seconds: i64 },
    #[error("Invalid link. Make sure you copied it completely from the email.")]
    Invalid,
}

pub struct RecoverySigner {
    key: hmac::Key,
    max_age_seconds: i64,
}

impl RecoverySigner {
    pub fn new(secret: &str, salt: &str, max_age_seconds: i64) -> Self {
        let master = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
        let derived = hmac::sign(&master, format!("{salt}signer").as_bytes());

        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, derived.as_ref()),
            max_age_seconds,
        }
    }

    pub fn max_age_seconds(&self) -> i64 {
        self.max_age_seconds
    }

    /// Issue a token for `email`, timestamped now.
    pub fn issue(&self, email: &str) -> String {
        self.issue_at(email, chrono::Utc::now().timestamp())
    }

    pub fn issue_at(&self, email: &str, issued_at: i64) -> String {
        let payload = URL_SAFE_NO_PAD.encode(email.as_bytes());
        let timestamp = URL_SAFE_NO_PAD.encode(issued_at.to_be_bytes());
        let signed = format!("{payload}.{timestamp}");
        let signature = hmac::sign(&self.key, signed.as_bytes());

        format!("{signed}.{}", URL_SAFE_NO_PAD.encode(signature.as_ref()))
    }

    /// Verify a token and return the email it carries.
    pub fn verify(&self, token: &str) -> Result<String, RecoveryError> {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }

    /// The signature is checked before the age, so a tampered token is
    /// always `Invalid` regardless of its timestamp.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<String, RecoveryError> {
        let (signed, signature) = token.trim().rsplit_once('.').ok_or(RecoveryError::Invalid)?;
        let signature = decode(signature)?;
        hmac::verify(&self.key, signed.as_bytes(), &signature)
            .map_err(|_| RecoveryError::Invalid)?;

        let (payload, timestamp) = signed.split_once('.').ok_or(RecoveryError::Invalid)?;
        let timestamp: [u8; 8] = decode(timestamp)?
            .try_into()
            .map_err(|_| RecoveryError::Invalid)?;
        let issued_at = i64::from_be_bytes(timestamp);

        let age_seconds = now - issued_at;
        if !(0..=self.max_age_seconds).contains(&age_seconds) {
            return Err(RecoveryError::Expired { age_seconds });
        }

        String::from_utf8(decode(payload)?).map_err(|_| RecoveryError::Invalid)
    }
}

fn decode(part: &str) -> Result<Vec<u8>, RecoveryError> {
    URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| RecoveryError::Invalid)
}
