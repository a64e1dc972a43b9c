//! Remote identity provider
//!
//! Resolves the viewer from the backend's `/auth/v1/user` endpoint using
//! the shared access token.

use async_trait::async_trait;
use serde::Deserialize;

use super::{AccessToken, AuthUser, IdentityProvider};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    email: Option<String>,
}

/// HTTP identity provider
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    /// e.g., "https://abc.example.co/auth/v1"
    auth_url: String,
    api_key: String,
    token: AccessToken,
}

impl HttpIdentityProvider {
    pub fn new(
        client: reqwest::Client,
        auth_url: String,
        api_key: String,
        token: AccessToken,
    ) -> Self {
        Self {
            client,
            auth_url: auth_url.trim_end_matches('/').to_string(),
            api_key,
            token,
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn current_user(&self) -> Result<Option<AuthUser>, AppError> {
        let Some(token) = self.token.get() else {
            tracing::debug!("No access token; viewer is unauthenticated");
            return Ok(None);
        };

        let response = self
            .client
            .get(format!("{}/user", self.auth_url))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            tracing::info!(%status, "Access token rejected; treating viewer as unauthenticated");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Remote(format!("{status}: {body}")));
        }

        let user: UserResponse = response.json().await?;
        Ok(Some(AuthUser {
            id: user.id,
            email: user.email,
        }))
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        let Some(token) = self.token.get() else {
            return Ok(());
        };

        let result = self
            .client
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await;

        // The local token is dropped even if the remote call fails.
        self.token.clear();

        let response = result?;
        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!(%status, "Remote sign-out failed; local session cleared");
            return Err(AppError::Remote(format!("sign-out failed: {status}")));
        }
        Ok(())
    }
}
