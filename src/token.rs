//! RS256 bearer-token signing and verification.
//!
//! The private key signs, the public key verifies; both are loaded once at
//! startup and a parse failure is fatal. Access tokens carry identity plus
//! role claims; refresh tokens carry only the owning user and the `jti`
//! pointing at the server-side refresh record.

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_ACCESS_TTL_SECONDS: u64 = 15 * 60;
pub const DEFAULT_REFRESH_TTL_SECONDS: u64 = 168 * 60 * 60;
pub const DEFAULT_ISSUER: &str = "mein-idaas";
pub const DEFAULT_AUDIENCE: &str = "self-hosted-idaas";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token rejected: {0}")]
    Verification(#[from] jsonwebtoken::errors::Error),
    #[error("invalid subject claim")]
    InvalidSubject,
    #[error("invalid jti claim")]
    InvalidTokenId,
}

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub roles: Vec<String>,
    pub iss: String,
    pub aud: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    /// Parse the subject claim back into a user id.
    ///
    /// # Errors
    /// Returns `InvalidSubject` when the subject is not a UUID.
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::InvalidSubject)
    }
}

/// Claims carried by a refresh token. No roles, no audience.
#[derive(Debug, Serialize, Deserialize)]
struct RefreshClaims {
    sub: String,
    jti: String,
    iss: String,
    iat: i64,
    exp: i64,
}

/// Mints and verifies the service's JWTs. Built once at startup and shared.
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: Vec<String>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    access_validation: Validation,
    refresh_validation: Validation,
}

impl TokenSigner {
    /// Build a signer from PEM-encoded RSA keys.
    ///
    /// # Errors
    /// Returns an error if either PEM fails to parse or the audience list is
    /// empty.
    pub fn new(
        private_pem: &[u8],
        public_pem: &[u8],
        issuer: String,
        audience: Vec<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self> {
        let encoding =
            EncodingKey::from_rsa_pem(private_pem).context("failed to parse RSA private key")?;
        let decoding =
            DecodingKey::from_rsa_pem(public_pem).context("failed to parse RSA public key")?;
        if audience.is_empty() {
            return Err(anyhow!("token audience list must not be empty"));
        }

        let mut access_validation = Validation::new(Algorithm::RS256);
        access_validation.set_issuer(&[&issuer]);
        access_validation.set_audience(&audience);

        let mut refresh_validation = Validation::new(Algorithm::RS256);
        refresh_validation.set_issuer(&[&issuer]);
        refresh_validation.validate_aud = false;

        Ok(Self {
            encoding,
            decoding,
            issuer,
            audience,
            access_ttl,
            refresh_ttl,
            access_validation,
            refresh_validation,
        })
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mint an access token over the user's current roles.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_access(&self, user_id: Uuid, roles: &[String]) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            roles: roles.to_vec(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            exp: now + ttl_seconds(self.access_ttl),
        };
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &self.encoding)?)
    }

    /// Sign a refresh token binding `rid` to its owner.
    ///
    /// Also used to re-sign an existing record id when a rotation retry is
    /// collapsed onto the already-created child.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_refresh(&self, rid: Uuid, user_id: Uuid) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            jti: rid.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + ttl_seconds(self.refresh_ttl),
        };
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &self.encoding)?)
    }

    /// Verify an access token and return its claims.
    ///
    /// # Errors
    /// Returns an error for bad signatures, expiry, or issuer/audience
    /// mismatches.
    pub fn parse_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let data = decode::<AccessClaims>(token, &self.decoding, &self.access_validation)?;
        Ok(data.claims)
    }

    /// Verify a refresh token and return `(user_id, rid)`.
    ///
    /// # Errors
    /// Returns an error for bad signatures, expiry, issuer mismatches, or
    /// malformed subject/jti claims.
    pub fn parse_refresh(&self, token: &str) -> Result<(Uuid, Uuid), TokenError> {
        let data = decode::<RefreshClaims>(token, &self.decoding, &self.refresh_validation)?;
        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| TokenError::InvalidSubject)?;
        let rid = Uuid::parse_str(&data.claims.jti).map_err(|_| TokenError::InvalidTokenId)?;
        Ok((user_id, rid))
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

fn ttl_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use rsa::{RsaPrivateKey, RsaPublicKey};
    use std::sync::OnceLock;

    static TEST_KEYS: OnceLock<(String, String)> = OnceLock::new();

    /// One shared RSA-2048 keypair for the whole test binary; generation is
    /// slow enough in debug builds to be worth caching.
    pub(crate) fn test_keys() -> &'static (String, String) {
        TEST_KEYS.get_or_init(|| {
            let mut rng = rand::thread_rng();
            let private = RsaPrivateKey::new(&mut rng, 2048).unwrap();
            let public = RsaPublicKey::from(&private);
            (
                private.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
                public.to_public_key_pem(LineEnding::LF).unwrap(),
            )
        })
    }

    pub(crate) fn test_signer() -> TokenSigner {
        let (private_pem, public_pem) = test_keys();
        TokenSigner::new(
            private_pem.as_bytes(),
            public_pem.as_bytes(),
            DEFAULT_ISSUER.to_string(),
            vec![DEFAULT_AUDIENCE.to_string()],
            Duration::from_secs(DEFAULT_ACCESS_TTL_SECONDS),
            Duration::from_secs(DEFAULT_REFRESH_TTL_SECONDS),
        )
        .unwrap()
    }

    #[test]
    fn access_token_round_trip() {
        let signer = test_signer();
        let user_id = Uuid::new_v4();
        let roles = vec!["user".to_string(), "admin".to_string()];

        let token = signer.issue_access(user_id, &roles).unwrap();
        let claims = signer.parse_access(&token).unwrap();

        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.roles, roles);
        assert_eq!(claims.iss, DEFAULT_ISSUER);
        assert_eq!(claims.aud, vec![DEFAULT_AUDIENCE.to_string()]);
        assert_eq!(
            claims.exp - claims.iat,
            i64::try_from(DEFAULT_ACCESS_TTL_SECONDS).unwrap()
        );
    }

    #[test]
    fn refresh_token_round_trip() {
        let signer = test_signer();
        let user_id = Uuid::new_v4();
        let rid = Uuid::new_v4();

        let token = signer.issue_refresh(rid, user_id).unwrap();
        let (parsed_user, parsed_rid) = signer.parse_refresh(&token).unwrap();

        assert_eq!(parsed_user, user_id);
        assert_eq!(parsed_rid, rid);
    }

    #[test]
    fn refresh_token_is_rejected_as_access_token() {
        let signer = test_signer();
        let token = signer.issue_refresh(Uuid::new_v4(), Uuid::new_v4()).unwrap();
        assert!(signer.parse_access(&token).is_err());
    }

    #[test]
    fn access_token_is_rejected_as_refresh_token() {
        let signer = test_signer();
        let token = signer
            .issue_access(Uuid::new_v4(), &["user".to_string()])
            .unwrap();
        assert!(signer.parse_refresh(&token).is_err());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let signer = test_signer();
        let token = signer
            .issue_access(Uuid::new_v4(), &["user".to_string()])
            .unwrap();
        let mut tampered = token.clone();
        // Flip the final signature character.
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });
        assert!(signer.parse_access(&tampered).is_err());
    }

    #[test]
    fn issuer_mismatch_is_rejected() {
        let (private_pem, public_pem) = test_keys();
        let other = TokenSigner::new(
            private_pem.as_bytes(),
            public_pem.as_bytes(),
            "someone-else".to_string(),
            vec![DEFAULT_AUDIENCE.to_string()],
            Duration::from_secs(60),
            Duration::from_secs(60),
        )
        .unwrap();

        let signer = test_signer();
        let token = signer
            .issue_access(Uuid::new_v4(), &["user".to_string()])
            .unwrap();
        assert!(other.parse_access(&token).is_err());
    }

    #[test]
    fn garbage_private_key_is_fatal() {
        let (_, public_pem) = test_keys();
        let result = TokenSigner::new(
            b"not a pem",
            public_pem.as_bytes(),
            DEFAULT_ISSUER.to_string(),
            vec![DEFAULT_AUDIENCE.to_string()],
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        assert!(result.is_err());
    }

    #[test]
    fn empty_audience_is_rejected() {
        let (private_pem, public_pem) = test_keys();
        let result = TokenSigner::new(
            private_pem.as_bytes(),
            public_pem.as_bytes(),
            DEFAULT_ISSUER.to_string(),
            Vec::new(),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        assert!(result.is_err());
    }
}
