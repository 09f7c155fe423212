// Backend DTOs for authentication and users

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default token lifetime when the backend omits `expiresIn` (seconds)
pub const DEFAULT_EXPIRES_IN: i64 = 3600;

/// `POST /auth/login` request
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// `POST /auth/google` request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLoginRequest {
    pub id_token: String,
}

/// `POST /auth/refresh` request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// `POST /users` request
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Profile fields the backend accepts at signup (birth date, height, ...)
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

/// Token payload returned by login and refresh endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(alias = "token", alias = "access_token")]
    pub access_token: String,
    #[serde(default, alias = "refresh_token")]
    pub refresh_token: Option<String>,
    #[serde(default, alias = "expires_in")]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub user: Option<User>,
}

/// User profile as returned by `/users/{id}` and login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Remaining profile fields, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
