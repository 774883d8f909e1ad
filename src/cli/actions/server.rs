use crate::{
    api,
    api::handlers::auth::{AuthConfig, EngineConfig},
    mailer::SmtpConfig,
    password::PasswordHasher,
    token::TokenSigner,
};
use anyhow::{Context, Result};
use chrono::NaiveTime;
use std::{fs, sync::Arc, time::Duration};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub rsa_private_key_path: String,
    pub rsa_public_key_path: String,
    pub access_ttl_seconds: u64,
    pub refresh_ttl_seconds: u64,
    pub grace_period_seconds: u64,
    pub otp_ttl_seconds: u64,
    pub issuer: String,
    pub audience: Vec<String>,
    pub cookie_path: String,
    pub argon2_memory_kib: u32,
    pub argon2_time: u32,
    pub argon2_parallelism: u32,
    pub argon2_key_length: usize,
    pub argon2_salt_length: usize,
    pub smtp: Option<SmtpConfig>,
    pub mailer_queue_capacity: usize,
    pub janitor_time: NaiveTime,
}

/// Execute the server action.
///
/// Signing keys are loaded and parsed here, once; a bad key aborts startup.
///
/// # Errors
/// Returns an error if a key file cannot be read or parsed, the hash
/// parameters are invalid, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let private_pem = fs::read(&args.rsa_private_key_path).with_context(|| {
        format!(
            "failed to read RSA private key: {}",
            args.rsa_private_key_path
        )
    })?;
    let public_pem = fs::read(&args.rsa_public_key_path).with_context(|| {
        format!(
            "failed to read RSA public key: {}",
            args.rsa_public_key_path
        )
    })?;

    let signer = Arc::new(TokenSigner::new(
        &private_pem,
        &public_pem,
        args.issuer,
        args.audience,
        Duration::from_secs(args.access_ttl_seconds),
        Duration::from_secs(args.refresh_ttl_seconds),
    )?);

    let hasher = PasswordHasher::new(
        args.argon2_memory_kib,
        args.argon2_time,
        args.argon2_parallelism,
        args.argon2_key_length,
        args.argon2_salt_length,
    )?;

    let engine_config = EngineConfig {
        grace_period: Duration::from_secs(args.grace_period_seconds),
        otp_ttl: Duration::from_secs(args.otp_ttl_seconds),
    };
    let auth_config = AuthConfig::new().with_cookie_path(args.cookie_path);

    api::new(
        args.port,
        args.dsn,
        signer,
        hasher,
        engine_config,
        auth_config,
        args.smtp,
        args.mailer_queue_capacity,
        args.janitor_time,
    )
    .await
}
