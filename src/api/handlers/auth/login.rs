//! Login endpoint.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;

use super::error::{AuthError, error_response};
use super::refresh::refresh_cookie;
use super::state::AuthState;
use super::types::{ErrorResponse, LoginRequest, LoginResponse};
use super::utils::{client_meta, normalize_email, valid_email};

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = LoginResponse),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Email not verified", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return error_response(&AuthError::InvalidInput("missing payload".to_string()));
    };

    // Validation stays identical for known and unknown accounts; everything
    // past this point answers `invalid credentials` uniformly.
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return error_response(&AuthError::InvalidInput("invalid email".to_string()));
    }
    if request.password.is_empty() {
        return error_response(&AuthError::InvalidInput(
            "password must not be empty".to_string(),
        ));
    }

    let client = client_meta(&headers);
    match state.engine().login(&email, &request.password, &client).await {
        Ok(grant) => {
            let mut response_headers = HeaderMap::new();
            match refresh_cookie(
                state.config(),
                &grant.refresh,
                state.engine().signer().refresh_ttl(),
            ) {
                Ok(cookie) => {
                    response_headers.insert(SET_COOKIE, cookie);
                }
                Err(err) => error!("failed to build refresh cookie: {err}"),
            }
            (
                StatusCode::OK,
                response_headers,
                Json(LoginResponse {
                    access_token: grant.access,
                    refresh_token: grant.refresh,
                    expires_in: grant.expires_in,
                }),
            )
                .into_response()
        }
        Err(err) => error_response(&err),
    }
}
