//! Orchestration of registration, login, verification, token rotation, and
//! password maintenance.
//!
//! The engine holds no per-user locks: every ordering guarantee it needs
//! comes from the stores (unique keys for competing inserts, the conditional
//! `mark_replaced` update for competing rotations).

use anyhow::{Context, anyhow};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::AuthError;
use super::otp::{DEFAULT_OTP_TTL, OtpStore};
use super::storage::{
    IdentityStore, NewUser, RefreshRecord, RefreshStore, StoreError, UserAccount,
};
use super::utils::{
    ClientMeta, generate_otp_code, generate_temp_password, hash_refresh_token, normalize_email,
};
use crate::mailer::{EmailMessage, MailerHandle};
use crate::password::{PasswordError, PasswordHasher};
use crate::token::TokenSigner;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Tunables that are not owned by the token signer.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Window after a rotation during which a retry with the parent token is
    /// collapsed onto the existing child instead of being treated as theft.
    pub grace_period: Duration,
    pub otp_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            otp_ttl: DEFAULT_OTP_TTL,
        }
    }
}

/// Outcome of a successful login or rotation.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access: String,
    pub refresh: String,
    /// Access-token lifetime in seconds.
    pub expires_in: u64,
}

#[derive(Debug, Clone)]
pub struct RegisteredUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

enum OtpPurpose {
    Verification,
    PasswordChange,
    PasswordReset,
}

pub struct AuthEngine {
    identity: Arc<dyn IdentityStore>,
    refresh: Arc<dyn RefreshStore>,
    otp: Arc<dyn OtpStore>,
    signer: Arc<TokenSigner>,
    hasher: PasswordHasher,
    mailer: MailerHandle,
    config: EngineConfig,
}

impl AuthEngine {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        refresh: Arc<dyn RefreshStore>,
        otp: Arc<dyn OtpStore>,
        signer: Arc<TokenSigner>,
        hasher: PasswordHasher,
        mailer: MailerHandle,
        config: EngineConfig,
    ) -> Self {
        Self {
            identity,
            refresh,
            otp,
            signer,
            hasher,
            mailer,
            config,
        }
    }

    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Create the user, their password credential, and the default role in
    /// one transaction, then fire the verification code off the request path.
    ///
    /// # Errors
    /// `EmailInUse` for a duplicate email.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisteredUser, AuthError> {
        let email = normalize_email(email);
        let password_hash = self.hash_password(password).await?;

        let account = match self
            .identity
            .create_user(NewUser {
                name: name.to_string(),
                email,
                password_hash,
            })
            .await
        {
            Ok(account) => account,
            Err(StoreError::Duplicate) => return Err(AuthError::EmailInUse),
            Err(err) => return Err(err.into()),
        };

        // Post-commit: a failure to hand off the code must not undo the
        // registration.
        self.send_code(&account, OtpPurpose::Verification).await;
        info!(user_id = %account.id, "user registered");

        Ok(RegisteredUser {
            id: account.id,
            name: account.name,
            email: account.email,
        })
    }

    /// Check a submitted verification code and activate the account.
    ///
    /// # Errors
    /// `NotFound` for an unknown email, `InvalidCode` for a wrong, expired,
    /// or absent code. An accepted code is consumed and cannot be accepted
    /// again.
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let account = self
            .identity
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::NotFound)?;

        self.consume_otp(account.id, code).await?;

        if !account.email_verified {
            self.identity.mark_email_verified(account.id).await?;
            info!(user_id = %account.id, "email verified");
        }
        Ok(())
    }

    /// Generate and dispatch a fresh verification code, superseding any
    /// outstanding one.
    ///
    /// # Errors
    /// `NotFound` for an unknown email.
    pub async fn resend_code(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let account = self
            .identity
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::NotFound)?;
        self.send_code(&account, OtpPurpose::Verification).await;
        Ok(())
    }

    /// Validate credentials and mint a token pair.
    ///
    /// # Errors
    /// `InvalidCredentials` uniformly for unknown user, missing credential,
    /// or wrong password; `EmailNotVerified` (with a fresh code dispatched)
    /// when the account is not activated yet.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: &ClientMeta,
    ) -> Result<TokenGrant, AuthError> {
        let email = normalize_email(email);
        let Some(account) = self.identity.find_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        let Some(stored_hash) = account.password_hash.as_deref() else {
            return Err(AuthError::InvalidCredentials);
        };
        if !self.verify_password(stored_hash, password).await? {
            return Err(AuthError::InvalidCredentials);
        }

        if !account.email_verified {
            self.send_code(&account, OtpPurpose::Verification).await;
            return Err(AuthError::EmailNotVerified);
        }

        self.issue_grant(&account, client).await
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// The three rotation cases:
    /// - fresh parent: create a child record, then claim the parent with the
    ///   conditional update; losing the claim compensates by deleting the
    ///   child;
    /// - already-replaced parent inside the grace window: re-sign the
    ///   existing child, mint a new access token, write nothing;
    /// - already-replaced parent outside the grace window: reuse detection —
    ///   every outstanding token for the user is revoked.
    ///
    /// # Errors
    /// `InvalidToken`, `Revoked`, `ReuseDetected`, `Inconsistent`,
    /// `RotationFailed` per the cases above.
    pub async fn rotate(
        &self,
        refresh_jwt: &str,
        client: &ClientMeta,
    ) -> Result<TokenGrant, AuthError> {
        let Ok((user_id, rid)) = self.signer.parse_refresh(refresh_jwt) else {
            return Err(AuthError::InvalidToken);
        };
        let Some(record) = self.refresh.get_by_id(rid).await? else {
            return Err(AuthError::InvalidToken);
        };
        if record.user_id != user_id {
            return Err(AuthError::InvalidToken);
        }
        if record.revoked_at.is_some() {
            return Err(AuthError::Revoked);
        }

        if let Some(replaced_at) = record.replaced_at {
            let age = Utc::now().signed_duration_since(replaced_at);
            let grace = chrono::Duration::from_std(self.config.grace_period)
                .unwrap_or_else(|_| chrono::Duration::zero());
            if age > grace {
                let revoked = self.refresh.revoke_all_for_user(record.user_id).await?;
                warn!(
                    user_id = %record.user_id,
                    revoked,
                    "refresh token reuse detected, user sessions revoked"
                );
                return Err(AuthError::ReuseDetected);
            }
            return self.reissue_for_child(&record).await;
        }

        self.rotate_fresh(&record, client).await
    }

    /// Case N: first presentation of this parent.
    async fn rotate_fresh(
        &self,
        parent: &RefreshRecord,
        client: &ClientMeta,
    ) -> Result<TokenGrant, AuthError> {
        let account = self.load_owner(parent.user_id).await?;
        let access = self
            .signer
            .issue_access(account.id, &account.roles)
            .map_err(signing_failure)?;

        let rid = Uuid::new_v4();
        let refresh_jwt = self
            .signer
            .issue_refresh(rid, account.id)
            .map_err(signing_failure)?;
        let child = self.new_refresh_record(rid, account.id, &refresh_jwt, client);
        self.refresh.create(&child).await?;

        // Linearization point: exactly one rotation of this parent can claim
        // it. A lost or failed claim must not leave the child behind.
        let claimed = self
            .refresh
            .mark_replaced(parent.id, rid, child.created_at)
            .await;
        let claimed = match claimed {
            Ok(claimed) => claimed,
            Err(err) => {
                self.compensate_orphan(rid).await;
                error!(parent = %parent.id, "rotation claim failed: {err}");
                return Err(AuthError::RotationFailed);
            }
        };
        if !claimed {
            self.compensate_orphan(rid).await;
            return Err(AuthError::RotationFailed);
        }

        Ok(TokenGrant {
            access,
            refresh: refresh_jwt,
            expires_in: self.signer.access_ttl().as_secs(),
        })
    }

    /// Case G: a retry inside the grace window collapses onto the child the
    /// winning rotation already created. No writes happen here.
    async fn reissue_for_child(&self, parent: &RefreshRecord) -> Result<TokenGrant, AuthError> {
        let Some(child_id) = parent.replaced_by else {
            return Err(AuthError::Inconsistent);
        };
        let Some(child) = self.refresh.get_by_id(child_id).await? else {
            return Err(AuthError::Inconsistent);
        };

        let account = self.load_owner(parent.user_id).await?;
        let access = self
            .signer
            .issue_access(account.id, &account.roles)
            .map_err(signing_failure)?;
        let refresh_jwt = self
            .signer
            .issue_refresh(child.id, child.user_id)
            .map_err(signing_failure)?;

        Ok(TokenGrant {
            access,
            refresh: refresh_jwt,
            expires_in: self.signer.access_ttl().as_secs(),
        })
    }

    /// Dispatch a password-change code to the authenticated user's email.
    ///
    /// # Errors
    /// `NotFound` when the token's subject no longer resolves.
    pub async fn send_change_otp(&self, user_id: Uuid) -> Result<String, AuthError> {
        let account = self
            .identity
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;
        self.send_code(&account, OtpPurpose::PasswordChange).await;
        Ok(account.email)
    }

    /// Change the password after OTP and old-password checks.
    ///
    /// Outstanding refresh records are left untouched.
    ///
    /// # Errors
    /// `InvalidCode`, `InvalidCredentials`, or `InvalidInput` when the new
    /// password equals the old one.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
        otp_code: &str,
    ) -> Result<String, AuthError> {
        self.consume_otp(user_id, otp_code).await?;

        let account = self
            .identity
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;
        let Some(stored_hash) = account.password_hash.as_deref() else {
            return Err(AuthError::InvalidCredentials);
        };
        if !self.verify_password(stored_hash, old_password).await? {
            return Err(AuthError::InvalidCredentials);
        }
        if old_password == new_password {
            return Err(AuthError::InvalidInput(
                "new password must differ from the old one".to_string(),
            ));
        }

        let new_hash = self.hash_password(new_password).await?;
        self.identity
            .replace_password_hash(account.id, &new_hash)
            .await?;
        info!(user_id = %account.id, "password changed");
        Ok(account.email)
    }

    /// Dispatch a reset code if the email resolves. Always succeeds from the
    /// caller's perspective so the endpoint cannot be used to enumerate
    /// accounts.
    ///
    /// # Errors
    /// Only on store failures.
    pub async fn send_reset_otp(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        match self.identity.find_by_email(&email).await? {
            Some(account) => {
                self.send_code(&account, OtpPurpose::PasswordReset).await;
            }
            None => {
                info!("password reset requested for unknown email");
            }
        }
        Ok(())
    }

    /// Consume the reset OTP, replace the password with a random temporary
    /// one, and deliver it out of band.
    ///
    /// # Errors
    /// `NotFound` for an unknown email, `InvalidCode` for a bad OTP.
    pub async fn reset_password(&self, email: &str, otp_code: &str) -> Result<String, AuthError> {
        let email = normalize_email(email);
        let account = self
            .identity
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::NotFound)?;

        self.consume_otp(account.id, otp_code).await?;

        let temp_password = generate_temp_password();
        let hash = self.hash_password(&temp_password).await?;
        self.identity
            .replace_password_hash(account.id, &hash)
            .await?;
        self.mailer.enqueue(EmailMessage::TemporaryPassword {
            to: account.email.clone(),
            value: temp_password,
        });
        info!(user_id = %account.id, "password reset with temporary password");
        Ok(account.email)
    }

    async fn issue_grant(
        &self,
        account: &UserAccount,
        client: &ClientMeta,
    ) -> Result<TokenGrant, AuthError> {
        let access = self
            .signer
            .issue_access(account.id, &account.roles)
            .map_err(signing_failure)?;
        let rid = Uuid::new_v4();
        let refresh_jwt = self
            .signer
            .issue_refresh(rid, account.id)
            .map_err(signing_failure)?;

        let record = self.new_refresh_record(rid, account.id, &refresh_jwt, client);
        self.refresh.create(&record).await?;

        Ok(TokenGrant {
            access,
            refresh: refresh_jwt,
            expires_in: self.signer.access_ttl().as_secs(),
        })
    }

    fn new_refresh_record(
        &self,
        rid: Uuid,
        user_id: Uuid,
        refresh_jwt: &str,
        client: &ClientMeta,
    ) -> RefreshRecord {
        let now = Utc::now();
        RefreshRecord {
            id: rid,
            user_id,
            token_hash: hash_refresh_token(refresh_jwt),
            client_ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            expires_at: now + self.signer.refresh_ttl(),
            replaced_at: None,
            replaced_by: None,
            revoked_at: None,
            created_at: now,
        }
    }

    async fn load_owner(&self, user_id: Uuid) -> Result<UserAccount, AuthError> {
        self.identity.find_by_id(user_id).await?.ok_or_else(|| {
            AuthError::Internal(anyhow!("user {user_id} missing for refresh record"))
        })
    }

    async fn compensate_orphan(&self, rid: Uuid) {
        if let Err(err) = self.refresh.delete_by_id(rid).await {
            error!("failed to delete orphan refresh record {rid}: {err}");
        }
    }

    async fn send_code(&self, account: &UserAccount, purpose: OtpPurpose) {
        let code = generate_otp_code();
        self.otp
            .save(account.id, code.clone(), self.config.otp_ttl)
            .await;
        let to = account.email.clone();
        let message = match purpose {
            OtpPurpose::Verification => EmailMessage::EmailVerification { to, code },
            OtpPurpose::PasswordChange => EmailMessage::PasswordChangeOtp { to, code },
            OtpPurpose::PasswordReset => EmailMessage::PasswordResetOtp { to, code },
        };
        self.mailer.enqueue(message);
    }

    /// Single-use check. The compare-and-remove is one atomic store
    /// operation, so a double-submitted code cannot be accepted twice.
    async fn consume_otp(&self, user_id: Uuid, input: &str) -> Result<(), AuthError> {
        if !self.otp.take_if_matches(user_id, input).await {
            return Err(AuthError::InvalidCode);
        }
        Ok(())
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let result = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .context("password hashing task failed")?;
        result.map_err(|err| match err {
            PasswordError::EmptyInput => {
                AuthError::InvalidInput("password must not be empty".to_string())
            }
            other => AuthError::Internal(anyhow::Error::new(other)),
        })
    }

    /// Returns whether the password matches. Malformed stored hashes are an
    /// internal error, not a mismatch.
    async fn verify_password(&self, encoded: &str, password: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let encoded = encoded.to_string();
        let password = password.to_string();
        let result = tokio::task::spawn_blocking(move || hasher.verify(&encoded, &password))
            .await
            .context("password verification task failed")?;
        match result {
            Ok(()) => Ok(true),
            Err(PasswordError::Mismatch | PasswordError::EmptyInput) => Ok(false),
            Err(PasswordError::MalformedHash) => Err(AuthError::Internal(anyhow!(
                "stored password hash is malformed"
            ))),
        }
    }
}

fn signing_failure(err: crate::token::TokenError) -> AuthError {
    AuthError::Internal(anyhow::Error::new(err))
}
