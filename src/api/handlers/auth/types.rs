//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login response: the refresh token travels both in the body and in the
/// auth-scoped cookie.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds.
    pub expires_in: u64,
}

/// Refresh response: the rotated refresh token travels in the cookie only.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshResponse {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub otp_code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageEmailResponse {
    pub message: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn register_request_round_trips() {
        let value = serde_json::json!({
            "name": "Ada",
            "email": "ada@x.test",
            "password": "Passw0rd!x",
        });
        let request: RegisterRequest = serde_json::from_value(value).unwrap();
        assert_eq!(request.name, "Ada");
        assert_eq!(request.email, "ada@x.test");
    }

    #[test]
    fn login_response_field_names() {
        let response = LoginResponse {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_in: 900,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["access_token"], "a");
        assert_eq!(value["refresh_token"], "r");
        assert_eq!(value["expires_in"], 900);
    }

    #[test]
    fn refresh_response_has_no_refresh_token_field() {
        let response = RefreshResponse {
            access_token: "a".to_string(),
            expires_in: 900,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("refresh_token").is_none());
    }

    #[test]
    fn error_response_shape() {
        let value = serde_json::to_value(ErrorResponse {
            error: "invalid credentials".to_string(),
        })
        .unwrap();
        assert_eq!(value["error"], "invalid credentials");
    }
}
