//! Registration endpoint.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;

use super::error::{AuthError, error_response};
use super::state::AuthState;
use super::types::{ErrorResponse, RegisterRequest, RegisterResponse};
use super::utils::{normalize_email, valid_email, valid_name, valid_password};

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = RegisterResponse),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 409, description = "Email already in use", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return error_response(&AuthError::InvalidInput("missing payload".to_string()));
    };

    let name = request.name.trim();
    if !valid_name(name) {
        return error_response(&AuthError::InvalidInput(
            "name must be between 2 and 50 characters".to_string(),
        ));
    }
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return error_response(&AuthError::InvalidInput("invalid email".to_string()));
    }
    if !valid_password(&request.password) {
        return error_response(&AuthError::InvalidInput(
            "password must be between 8 and 72 characters".to_string(),
        ));
    }

    match state.engine().register(name, &email, &request.password).await {
        Ok(user) => (
            StatusCode::CREATED,
            Json(RegisterResponse {
                id: user.id.to_string(),
                name: user.name,
                email: user.email,
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}
