//! Small helpers for auth validation, token hashing, and request metadata.

use axum::http::{HeaderMap, header::AUTHORIZATION};
use rand::{Rng, rngs::OsRng};
use regex::Regex;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub(super) const REFRESH_COOKIE_NAME: &str = "refresh_token";

const OTP_CODE_LENGTH: usize = 6;
const TEMP_PASSWORD_LENGTH: usize = 8;
const TEMP_PASSWORD_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    email_normalized.len() <= 255
        && Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
            .is_ok_and(|regex| regex.is_match(email_normalized))
}

pub(super) fn valid_name(name: &str) -> bool {
    let length = name.chars().count();
    (2..=50).contains(&length)
}

pub(super) fn valid_password(password: &str) -> bool {
    let length = password.chars().count();
    (8..=72).contains(&length)
}

pub(super) fn valid_otp_code(code: &str) -> bool {
    code.len() == OTP_CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

/// Hash a signed refresh token so raw values never touch the database.
/// The hash is the only secret of record besides the `jti`.
pub(crate) fn hash_refresh_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Uniformly random 6-digit code from the OS CSPRNG.
pub(super) fn generate_otp_code() -> String {
    let mut rng = OsRng;
    (0..OTP_CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Random 8-character alphanumeric temporary password. Uniform sampling over
/// the alphabet, no modulo bias.
pub(super) fn generate_temp_password() -> String {
    let mut rng = OsRng;
    (0..TEMP_PASSWORD_LENGTH)
        .map(|_| char::from(TEMP_PASSWORD_ALPHABET[rng.gen_range(0..TEMP_PASSWORD_ALPHABET.len())]))
        .collect()
}

/// Compare two short secrets without leaking where they diverge.
pub(super) fn constant_time_eq(left: &str, right: &str) -> bool {
    left.as_bytes().ct_eq(right.as_bytes()).into()
}

/// Client metadata captured alongside refresh records.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

pub(super) fn client_meta(headers: &HeaderMap) -> ClientMeta {
    ClientMeta {
        ip: extract_client_ip(headers),
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    }
}

/// Extract a client IP from common proxy headers.
pub(super) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

pub(super) fn extract_refresh_cookie(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == REFRESH_COOKIE_NAME && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
