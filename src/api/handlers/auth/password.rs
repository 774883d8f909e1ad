//! Password maintenance endpoints: authenticated change and the
//! unauthenticated forgot-password flow.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

use super::error::{AuthError, error_response};
use super::state::AuthState;
use super::types::{
    ChangePasswordRequest, ErrorResponse, ForgotPasswordRequest, MessageEmailResponse,
    MessageResponse, ResetPasswordRequest,
};
use super::utils::{
    extract_bearer_token, normalize_email, valid_email, valid_otp_code, valid_password,
};

#[utoipa::path(
    post,
    path = "/api/v1/auth/password-change/send-otp",
    responses(
        (status = 200, description = "Change code dispatched", body = MessageEmailResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 404, description = "Token subject no longer exists", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn send_change_otp(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let user_id = match authenticate(&headers, &state) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match state.engine().send_change_otp(user_id).await {
        Ok(email) => (
            StatusCode::OK,
            Json(MessageEmailResponse {
                message: "password change code sent".to_string(),
                email,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/password-change",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageEmailResponse),
        (status = 400, description = "Validation failed or bad code", body = ErrorResponse),
        (status = 401, description = "Missing token or wrong old password", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> impl IntoResponse {
    let user_id = match authenticate(&headers, &state) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return error_response(&AuthError::InvalidInput("missing payload".to_string()));
    };

    if !valid_password(&request.new_password) {
        return error_response(&AuthError::InvalidInput(
            "new password must be between 8 and 72 characters".to_string(),
        ));
    }
    let otp_code = request.otp_code.trim();
    if !valid_otp_code(otp_code) {
        return error_response(&AuthError::InvalidInput(
            "otp code must be exactly 6 digits".to_string(),
        ));
    }

    match state
        .engine()
        .change_password(user_id, &request.old_password, &request.new_password, otp_code)
        .await
    {
        Ok(email) => (
            StatusCode::OK,
            Json(MessageEmailResponse {
                message: "password changed".to_string(),
                email,
            }),
        )
            .into_response(),
        Err(err) => password_error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/forgot-password/send-otp",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Standard response regardless of whether the email exists", body = MessageResponse),
        (status = 400, description = "Validation failed", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn send_reset_otp(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return error_response(&AuthError::InvalidInput("missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return error_response(&AuthError::InvalidInput("invalid email".to_string()));
    }

    // The response is a contract: identical for known and unknown emails.
    match state.engine().send_reset_otp(&email).await {
        Ok(()) => standard_reset_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/forgot-password/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Temporary password dispatched", body = MessageEmailResponse),
        (status = 400, description = "Validation failed or bad code", body = ErrorResponse),
        (status = 404, description = "Unknown email", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return error_response(&AuthError::InvalidInput("missing payload".to_string()));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return error_response(&AuthError::InvalidInput("invalid email".to_string()));
    }
    let otp = request.otp.trim();
    if !valid_otp_code(otp) {
        return error_response(&AuthError::InvalidInput(
            "otp code must be exactly 6 digits".to_string(),
        ));
    }

    match state.engine().reset_password(&email, otp).await {
        Ok(email) => (
            StatusCode::OK,
            Json(MessageEmailResponse {
                message: "temporary password sent".to_string(),
                email,
            }),
        )
            .into_response(),
        Err(err) => password_error_response(&err),
    }
}

fn standard_reset_response() -> Response {
    (
        StatusCode::OK,
        Json(MessageResponse {
            message: "if the email exists, a reset code has been sent".to_string(),
        }),
    )
        .into_response()
}

/// Resolve the bearer access token into a user id.
fn authenticate(headers: &HeaderMap, state: &AuthState) -> Result<Uuid, Response> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err(unauthorized("missing bearer token"));
    };
    let claims = state
        .engine()
        .signer()
        .parse_access(&token)
        .map_err(|_| unauthorized("invalid access token"))?;
    claims.user_id().map_err(|_| unauthorized("invalid access token"))
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// On the password endpoints a bad OTP is a 400, not the 401 used by
/// `/verify`.
fn password_error_response(err: &AuthError) -> Response {
    if matches!(err, AuthError::InvalidCode) {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: err.public_message(),
            }),
        )
            .into_response()
    } else {
        error_response(err)
    }
}
