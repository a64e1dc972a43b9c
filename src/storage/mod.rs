//! Blob storage module
//!
//! Handles:
//! - Media uploads (public bucket)
//! - Public URL generation
//!
//! Three adapters share the [`BlobStore`] contract: the backend's own
//! object API, any S3-compatible bucket, and an in-process store.

mod memory;
mod rest;
mod s3;

pub use memory::MemoryBlobStore;
pub use rest::RestBlobStore;
pub use s3::S3BlobStore;

use async_trait::async_trait;

use crate::error::AppError;

/// Bucket that holds post and status media
pub const MEDIA_BUCKET: &str = "media";

/// Blob storage collaborator
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path` inside `bucket`
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), AppError>;

    /// Public URL for an object; never fails and never calls out
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Percent-encode each path segment, keeping the separators
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn build_s3_http_client() -> aws_sdk_s3::config::SharedHttpClient {
    use aws_smithy_runtime::client::http::hyper_014::HyperClientBuilder;

    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build();

    HyperClientBuilder::new().build(https_connector)
}
