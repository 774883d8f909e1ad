//! Email verification endpoints.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;

use super::error::{AuthError, error_response};
use super::state::AuthState;
use super::types::{ErrorResponse, MessageResponse, ResendRequest, VerifyEmailRequest};
use super::utils::{normalize_email, valid_email, valid_otp_code};

#[utoipa::path(
    post,
    path = "/api/v1/auth/verify",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 401, description = "Invalid or expired code", body = ErrorResponse),
        (status = 404, description = "Unknown email", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return error_response(&AuthError::InvalidInput("missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return error_response(&AuthError::InvalidInput("invalid email".to_string()));
    }
    let code = request.code.trim();
    if !valid_otp_code(code) {
        return error_response(&AuthError::InvalidInput(
            "code must be exactly 6 digits".to_string(),
        ));
    }

    match state.engine().verify_code(&email, code).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "email verified".to_string(),
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/resend",
    request_body = ResendRequest,
    responses(
        (status = 202, description = "Verification code dispatched", body = MessageResponse),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 404, description = "Unknown email", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return error_response(&AuthError::InvalidInput("missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return error_response(&AuthError::InvalidInput("invalid email".to_string()));
    }

    match state.engine().resend_code(&email).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(MessageResponse {
                message: "verification code sent".to_string(),
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}
