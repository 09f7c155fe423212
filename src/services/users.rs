use serde_json::Value;
use std::sync::Arc;

use super::decode;
use crate::error::ApiError;
use crate::http_client::ApiClient;
use crate::models::api::User;

/// `/users/{id}` reads and partial updates
pub struct UserService {
    api: Arc<ApiClient>,
}

impl UserService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn get(&self, id: i64) -> Result<User, ApiError> {
        let response = self.api.get(format!("/users/{}", id)).await?;
        decode(response)
    }

    /// PATCH the profile; refreshes the cached snapshot when it is the
    /// signed-in user
    pub async fn update(&self, id: i64, changes: Value) -> Result<User, ApiError> {
        let response = self.api.patch(format!("/users/{}", id), changes).await?;
        let user: User = decode(response)?;

        let tokens = self.api.tokens();
        if tokens.cached_user_id() == Some(user.id) {
            if let Err(e) = tokens.save_user(&user) {
                tracing::warn!("Failed to refresh cached user: {}", e);
            }
        }
        Ok(user)
    }
}
