//! Argon2id password hashing with self-describing PHC strings.
//!
//! New hashes always use the cost parameters this hasher was configured with.
//! Verification re-derives the key with the parameters embedded in the stored
//! string, so raising the global cost never invalidates older hashes.

use anyhow::{Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        self, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
        rand_core::{OsRng, RngCore},
    },
};
use thiserror::Error;

pub const DEFAULT_MEMORY_KIB: u32 = 64 * 1024;
pub const DEFAULT_TIME_COST: u32 = 3;
pub const DEFAULT_PARALLELISM: u32 = 4;
pub const DEFAULT_KEY_LENGTH: usize = 32;
pub const DEFAULT_SALT_LENGTH: usize = 16;

const MIN_SALT_LENGTH: usize = 8;
const MAX_SALT_LENGTH: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("empty password")]
    EmptyInput,
    #[error("malformed password hash")]
    MalformedHash,
    #[error("password mismatch")]
    Mismatch,
}

impl From<password_hash::Error> for PasswordError {
    fn from(err: password_hash::Error) -> Self {
        match err {
            password_hash::Error::Password => Self::Mismatch,
            _ => Self::MalformedHash,
        }
    }
}

/// Derives and verifies Argon2id hashes.
///
/// Cheap to clone; holds only the configured cost parameters.
#[derive(Clone, Debug)]
pub struct PasswordHasher {
    params: Params,
    salt_length: usize,
}

impl PasswordHasher {
    /// Build a hasher from configured cost parameters.
    ///
    /// # Errors
    /// Returns an error if the parameters are outside the ranges Argon2 accepts.
    pub fn new(
        memory_kib: u32,
        time_cost: u32,
        parallelism: u32,
        key_length: usize,
        salt_length: usize,
    ) -> Result<Self> {
        let params = Params::new(memory_kib, time_cost, parallelism, Some(key_length))
            .map_err(|err| anyhow!("invalid argon2 parameters: {err}"))?;
        if !(MIN_SALT_LENGTH..=MAX_SALT_LENGTH).contains(&salt_length) {
            return Err(anyhow!(
                "salt length must be between {MIN_SALT_LENGTH} and {MAX_SALT_LENGTH} bytes, got {salt_length}"
            ));
        }
        Ok(Self {
            params,
            salt_length,
        })
    }

    /// Hash a plaintext password into a PHC string with a fresh random salt.
    ///
    /// # Errors
    /// Returns `EmptyInput` for an empty password.
    pub fn hash(&self, plain: &str) -> Result<String, PasswordError> {
        if plain.is_empty() {
            return Err(PasswordError::EmptyInput);
        }

        let mut salt_bytes = vec![0u8; self.salt_length];
        OsRng.fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());
        let hash = argon2.hash_password(plain.as_bytes(), &salt)?;
        Ok(hash.to_string())
    }

    /// Verify a plaintext password against a stored PHC string.
    ///
    /// The algorithm, version, and cost parameters come from the stored
    /// string, never from this hasher's configuration. Key comparison is
    /// constant-time.
    ///
    /// # Errors
    /// `EmptyInput` for empty inputs, `MalformedHash` when the stored string
    /// does not parse, `Mismatch` when the password is wrong.
    pub fn verify(&self, encoded: &str, plain: &str) -> Result<(), PasswordError> {
        if plain.is_empty() || encoded.is_empty() {
            return Err(PasswordError::EmptyInput);
        }
        let parsed = PasswordHash::new(encoded).map_err(|_| PasswordError::MalformedHash)?;
        Argon2::default().verify_password(plain.as_bytes(), &parsed)?;
        Ok(())
    }
}
