//! Object API of the hosted backend
//!
//! `POST {base}/storage/v1/object/{bucket}/{path}` to upload,
//! `{base}/storage/v1/object/public/{bucket}/{path}` to serve.

use async_trait::async_trait;

use super::{BlobStore, encode_path};
use crate::auth::AccessToken;
use crate::error::AppError;

/// Blob store backed by the backend's object API
pub struct RestBlobStore {
    client: reqwest::Client,
    /// e.g., "https://abc.example.co/storage/v1"
    storage_url: String,
    api_key: String,
    token: AccessToken,
}

impl RestBlobStore {
    pub fn new(
        client: reqwest::Client,
        storage_url: String,
        api_key: String,
        token: AccessToken,
    ) -> Self {
        Self {
            client,
            storage_url: storage_url.trim_end_matches('/').to_string(),
            api_key,
            token,
        }
    }
}

#[async_trait]
impl BlobStore for RestBlobStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), AppError> {
        let bearer = self.token.get().unwrap_or_else(|| self.api_key.clone());
        let url = format!("{}/object/{}/{}", self.storage_url, bucket, encode_path(path));

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::CACHE_CONTROL, "max-age=3600")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AppError::Unauthenticated);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Storage(format!("upload failed ({status}): {body}")));
        }

        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/object/public/{}/{}",
            self.storage_url,
            bucket,
            encode_path(path)
        )
    }
}
