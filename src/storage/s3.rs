//! Media storage on an S3-compatible bucket
//!
//! Objects are uploaded with the S3 API and served from a public URL base
//! (custom domain or CDN) rather than from the API endpoint.

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;

use super::{BlobStore, encode_path};
use crate::config::StorageConfig;
use crate::error::AppError;

/// Blob store backed by an S3-compatible bucket
///
/// The bucket named in each call is mapped onto the configured bucket;
/// the logical bucket becomes the key prefix.
pub struct S3BlobStore {
    /// S3-compatible client
    client: S3Client,
    /// Physical bucket name
    bucket: String,
    /// Public URL base
    /// e.g., "https://media.example.com"
    public_url: String,
}

impl S3BlobStore {
    /// Create new S3 blob store
    ///
    /// # Errors
    /// Returns error if the endpoint, credentials or public URL are missing
    pub fn new(config: &StorageConfig) -> Result<Self, AppError> {
        use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

        let s3 = &config.s3;
        let endpoint = s3
            .endpoint
            .as_deref()
            .ok_or_else(|| AppError::Config("storage.s3.endpoint is required".to_string()))?;
        let (Some(access_key_id), Some(secret_access_key)) =
            (s3.access_key_id.as_deref(), s3.secret_access_key.as_deref())
        else {
            return Err(AppError::Config(
                "storage.s3 credentials are required".to_string(),
            ));
        };
        let public_url = config
            .public_url
            .as_deref()
            .ok_or_else(|| AppError::Config("storage.public_url is required".to_string()))?;

        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "moodfeed-s3",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(
                s3.region.clone().unwrap_or_else(|| "auto".to_string()),
            ))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .http_client(super::build_s3_http_client())
            .force_path_style(true)
            .build();

        Ok(Self {
            client: S3Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }

    fn key(bucket: &str, path: &str) -> String {
        format!("{}/{}", bucket, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), AppError> {
        use aws_sdk_s3::primitives::ByteStream;

        let key = Self::key(bucket, path);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .cache_control("public, max-age=31536000") // 1 year
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 upload failed: {}", e)))?;

        tracing::debug!(bucket = %self.bucket, key = %key, "Uploaded object");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/{}",
            self.public_url,
            encode_path(&Self::key(bucket, path))
        )
    }
}
