use serde_json::Value;
use std::sync::Arc;

use super::decode;
use crate::auth::{StorageError, TokenSet};
use crate::error::ApiError;
use crate::http_client::ApiClient;
use crate::models::api::{AuthResponse, GoogleLoginRequest, LoginRequest, SignupRequest, User};
use crate::models::request::RequestDescriptor;

/// Sign-in, sign-up and sign-out flows
pub struct AuthService {
    api: Arc<ApiClient>,
}

impl AuthService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// `POST /auth/login`, then persist the session
    pub async fn login(&self, username: &str, password: &str) -> Result<Option<User>, ApiError> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.authenticate("/auth/login", to_value(&request)?).await
    }

    /// `POST /auth/google` with a Google ID token
    pub async fn google_login(&self, id_token: &str) -> Result<Option<User>, ApiError> {
        let request = GoogleLoginRequest {
            id_token: id_token.to_string(),
        };
        self.authenticate("/auth/google", to_value(&request)?).await
    }

    /// `POST /users`, then log in with the same credentials
    pub async fn signup(&self, request: &SignupRequest) -> Result<Option<User>, ApiError> {
        let created = self.api.post("/users", to_value(request)?).await?;
        tracing::info!(status = created.status, "Account created for {}", request.username);
        self.login(&request.username, &request.password).await
    }

    /// Best-effort `POST /auth/logout`, then clear local state regardless of
    /// the backend's answer
    pub async fn logout(&self) -> Result<(), ApiError> {
        if self.api.tokens().access_token().is_some() {
            let descriptor = RequestDescriptor::post("/auth/logout").with_retry_attempts(0);
            if let Err(e) = self.api.execute(&descriptor).await {
                tracing::warn!("Backend logout failed, clearing local session anyway: {}", e);
            }
        }
        self.api.tokens().clear().map_err(storage_error)
    }

    /// Cached profile of the signed-in user, no network call
    pub fn current_user(&self) -> Option<User> {
        self.api.tokens().cached_user()
    }

    async fn authenticate(&self, path: &str, body: Value) -> Result<Option<User>, ApiError> {
        let response = self.api.post(path, body).await?;
        let auth: AuthResponse = decode(response)?;
        let user = auth.user.clone();

        let tokens = self.api.tokens();
        tokens.save(&TokenSet::from(auth)).map_err(storage_error)?;
        if let Some(ref user) = user {
            tokens.save_user(user).map_err(storage_error)?;
        }

        tracing::info!("Signed in via {}", path);
        Ok(user)
    }
}

fn to_value<T: serde::Serialize>(body: &T) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Unknown {
        message: format!("Failed to encode request: {}", e),
    })
}

fn storage_error(e: StorageError) -> ApiError {
    ApiError::Unknown {
        message: format!("Failed to update local session: {}", e),
    }
}
