//! Refresh endpoint: the boundary of the rotation state machine.
//!
//! The refresh token travels only in the auth-scoped cookie. Every failure
//! clears the cookie so a broken client stops replaying a dead token.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use super::error::{AuthError, error_response};
use super::state::{AuthConfig, AuthState};
use super::types::{ErrorResponse, RefreshResponse};
use super::utils::{REFRESH_COOKIE_NAME, client_meta, extract_refresh_cookie};

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    responses(
        (status = 200, description = "Rotated token pair; refresh cookie replaced", body = RefreshResponse),
        (status = 400, description = "Missing refresh cookie", body = ErrorResponse),
        (status = 401, description = "Invalid, revoked, or reused refresh token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(headers: HeaderMap, state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    let Some(token) = extract_refresh_cookie(&headers) else {
        return error_response(&AuthError::InvalidInput(
            "missing refresh cookie".to_string(),
        ));
    };

    let client = client_meta(&headers);
    match state.engine().rotate(&token, &client).await {
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
                Json(RefreshResponse {
                    access_token: grant.access,
                    expires_in: grant.expires_in,
                }),
            )
                .into_response()
        }
        Err(err) => {
            let mut response = error_response(&err);
            if let Ok(cookie) = clear_refresh_cookie(state.config()) {
                response.headers_mut().insert(SET_COOKIE, cookie);
            }
            response
        }
    }
}

/// Build the auth-scoped refresh cookie.
pub(super) fn refresh_cookie(
    config: &AuthConfig,
    token: &str,
    ttl: Duration,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let expires = (Utc::now() + ttl).format("%a, %d %b %Y %H:%M:%S GMT");
    let path = config.cookie_path();
    HeaderValue::from_str(&format!(
        "{REFRESH_COOKIE_NAME}={token}; Path={path}; HttpOnly; Secure; SameSite=Strict; Expires={expires}"
    ))
}

pub(super) fn clear_refresh_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let path = config.cookie_path();
    HeaderValue::from_str(&format!(
        "{REFRESH_COOKIE_NAME}=; Path={path}; HttpOnly; Secure; SameSite=Strict; Max-Age=0"
    ))
}
