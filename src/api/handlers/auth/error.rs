//! Typed error kinds surfaced by the auth engine and their HTTP mapping.

use anyhow::anyhow;
use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use thiserror::Error;
use tracing::error;

use super::storage::StoreError;
use super::types::ErrorResponse;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed payload or failed field validation.
    #[error("{0}")]
    InvalidInput(String),
    /// Wrong email or password. Deliberately indistinguishable from an
    /// unknown user.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Login blocked until the email is activated.
    #[error("email not verified")]
    EmailNotVerified,
    /// OTP wrong, expired, or absent.
    #[error("invalid or expired verification code")]
    InvalidCode,
    /// Refresh token cannot be parsed or does not resolve to a record.
    #[error("invalid refresh token")]
    InvalidToken,
    /// Refresh record was explicitly revoked.
    #[error("refresh token revoked")]
    Revoked,
    /// Replaced token presented outside the grace window.
    #[error("refresh token reuse detected")]
    ReuseDetected,
    #[error("email already in use")]
    EmailInUse,
    #[error("user not found")]
    NotFound,
    /// A replaced record without a loadable child. Should not happen.
    #[error("refresh token lineage is inconsistent")]
    Inconsistent,
    /// The store refused the rotation's critical update.
    #[error("failed to rotate refresh token")]
    RotationFailed,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            // Flows that expect a duplicate (registration) match on it before
            // this conversion; anywhere else it is an invariant violation.
            StoreError::Duplicate => Self::Internal(anyhow!("unexpected duplicate key")),
            StoreError::Backend(inner) => Self::Internal(inner),
        }
    }
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials
            | Self::InvalidCode
            | Self::InvalidToken
            | Self::Revoked
            | Self::ReuseDetected => StatusCode::UNAUTHORIZED,
            Self::EmailNotVerified => StatusCode::FORBIDDEN,
            Self::EmailInUse => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Inconsistent | Self::RotationFailed | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to return to the caller. Internal detail never leaks.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Default mapping from an engine error to an HTTP response.
pub(super) fn error_response(err: &AuthError) -> Response {
    let status = err.status();
    if status.is_server_error() {
        error!("auth operation failed: {err:#}");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.public_message(),
        }),
    )
        .into_response()
}
