// Token refresh logic

use anyhow::{Context, Result};
use reqwest::Client;

use super::types::TokenSet;
use crate::models::api::{AuthResponse, RefreshRequest};

/// Refresh endpoint for a base URL (plain concatenation, like every other path)
fn get_refresh_url(base_url: &str) -> String {
    format!("{}/auth/refresh", base_url)
}

/// Exchange a refresh token for a new token set
pub async fn refresh_session(
    client: &Client,
    base_url: &str,
    refresh_token: &str,
) -> Result<TokenSet> {
    tracing::info!("Refreshing access token...");

    let url = get_refresh_url(base_url);
    let request = RefreshRequest {
        refresh_token: refresh_token.to_string(),
    };

    let response = client
        .post(&url)
        .header("Content-Type", "application/json")
        .json(&request)
        .send()
        .await
        .context("Failed to send refresh request")?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        anyhow::bail!("Token refresh failed: {} - {}", status, error_text);
    }

    let data: AuthResponse = response
        .json()
        .await
        .context("Failed to parse refresh response")?;

    if data.access_token.is_empty() {
        anyhow::bail!("Refresh response does not contain accessToken");
    }

    let tokens = TokenSet::from(data);
    tracing::info!("Token refreshed, expires in {}s", tokens.expires_in);

    Ok(tokens)
}
