use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::refresh;
use super::storage::{
    KeyValueStore, StorageError, AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY, TOKEN_EXPIRY_KEY,
    USER_DATA_KEY, USER_ID_KEY,
};
use super::types::{decode_expiry, encode_expiry, expiry_from_now, StoredSession, TokenSet};
use crate::models::api::User;

/// Token lifecycle manager
///
/// Persists the session across two stores: tokens in the secure store,
/// expiry and the cached profile in the ordinary store. Expiry is detected
/// lazily on read; nothing runs in the background.
pub struct TokenManager {
    /// Access and refresh tokens
    secure: Arc<dyn KeyValueStore>,

    /// Expiry timestamp and cached user snapshot
    plain: Arc<dyn KeyValueStore>,

    /// HTTP client for refresh requests
    client: Client,

    /// API base URL the refresh endpoint is appended to
    base_url: String,

    /// Serializes refreshes so concurrent callers trigger at most one
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    /// Create a new TokenManager over the given stores
    pub fn new(
        base_url: impl Into<String>,
        secure: Arc<dyn KeyValueStore>,
        plain: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            secure,
            plain,
            client,
            base_url: base_url.into(),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Persist a freshly issued token set
    pub fn save(&self, tokens: &TokenSet) -> Result<(), StorageError> {
        self.secure.set(AUTH_TOKEN_KEY, &tokens.access_token)?;
        match tokens.refresh_token {
            Some(ref refresh_token) => self.secure.set(REFRESH_TOKEN_KEY, refresh_token)?,
            None => self.secure.remove(REFRESH_TOKEN_KEY)?,
        }

        // Expiry last: a reader racing this write sees no expiry and treats
        // the session as expired.
        let expires_at = expiry_from_now(tokens.expires_in);
        self.plain.set(TOKEN_EXPIRY_KEY, &encode_expiry(expires_at))?;

        tracing::debug!(
            expires_at = %expires_at.to_rfc3339(),
            has_refresh_token = tokens.refresh_token.is_some(),
            "Session saved"
        );
        Ok(())
    }

    /// Read the stored session, if any
    pub fn session(&self) -> Result<Option<StoredSession>, StorageError> {
        let access_token = match self.secure.get(AUTH_TOKEN_KEY)? {
            Some(token) => token,
            None => return Ok(None),
        };
        let refresh_token = self.secure.get(REFRESH_TOKEN_KEY)?;
        let expires_at = self
            .plain
            .get(TOKEN_EXPIRY_KEY)?
            .as_deref()
            .and_then(decode_expiry);

        Ok(Some(StoredSession {
            access_token,
            refresh_token,
            expires_at,
        }))
    }

    /// Raw read of the stored access token, no expiry check and no refresh.
    /// This is what the request pipeline attaches on every attempt.
    pub fn access_token(&self) -> Option<String> {
        match self.secure.get(AUTH_TOKEN_KEY) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Failed to read access token: {}", e);
                None
            }
        }
    }

    /// True iff a token is stored and has not expired. Never refreshes.
    pub fn is_authenticated(&self) -> bool {
        match self.session() {
            Ok(Some(session)) => !session.is_expired(),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("Failed to read session: {}", e);
                false
            }
        }
    }

    /// Get a usable access token, refreshing an expired one when possible.
    ///
    /// Returns `None` when the user is not authenticated. A failed refresh, or
    /// an expired session without a refresh token, clears all stored state.
    pub async fn get_valid_token(&self) -> Option<String> {
        let _guard = self.refresh_lock.lock().await;

        let session = match self.session() {
            Ok(Some(session)) => session,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to read session: {}", e);
                return None;
            }
        };

        if !session.is_expired() {
            return Some(session.access_token);
        }

        let refresh_token = match session.refresh_token {
            Some(token) => token,
            None => {
                tracing::info!("Session expired and no refresh token stored, signing out");
                self.clear_quietly();
                return None;
            }
        };

        match refresh::refresh_session(&self.client, &self.base_url, &refresh_token).await {
            Ok(mut tokens) => {
                // Keep the current refresh token if the backend did not rotate it
                if tokens.refresh_token.is_none() {
                    tokens.refresh_token = Some(refresh_token);
                }
                if let Err(e) = self.save(&tokens) {
                    tracing::error!("Failed to persist refreshed token: {}", e);
                    self.clear_quietly();
                    return None;
                }
                Some(tokens.access_token)
            }
            Err(e) => {
                tracing::error!("Token refresh failed: {:#}", e);
                self.clear_quietly();
                None
            }
        }
    }

    /// Remove every piece of stored auth state. Idempotent.
    pub fn clear(&self) -> Result<(), StorageError> {
        let results = [
            self.secure.remove(AUTH_TOKEN_KEY),
            self.secure.remove(REFRESH_TOKEN_KEY),
            self.plain.remove(TOKEN_EXPIRY_KEY),
            self.plain.remove(USER_DATA_KEY),
            self.plain.remove(USER_ID_KEY),
        ];
        tracing::debug!("Session cleared");
        results.into_iter().collect()
    }

    fn clear_quietly(&self) {
        if let Err(e) = self.clear() {
            tracing::warn!("Failed to clear session: {}", e);
        }
    }

    /// Cache the signed-in user's profile
    pub fn save_user(&self, user: &User) -> Result<(), StorageError> {
        let json = serde_json::to_string(user)?;
        self.plain.set(USER_DATA_KEY, &json)?;
        self.plain.set(USER_ID_KEY, &user.id.to_string())
    }

    /// Cached profile snapshot; unreadable data counts as absent
    pub fn cached_user(&self) -> Option<User> {
        let raw = self.plain.get(USER_DATA_KEY).ok().flatten()?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!("Ignoring unreadable cached user: {}", e);
                None
            }
        }
    }

    pub fn cached_user_id(&self) -> Option<i64> {
        self.plain
            .get(USER_ID_KEY)
            .ok()
            .flatten()
            .and_then(|id| id.parse().ok())
    }
}
