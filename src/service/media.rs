//! Media uploads
//!
//! Validates type and size before anything leaves the process, then stores
//! the file under `{user_id}/{unix_millis}.{ext}` in the media bucket.

use std::sync::Arc;

use crate::data::{MediaKind, MediaRef};
use crate::error::AppError;
use crate::metrics::{MEDIA_BYTES_UPLOADED, MEDIA_UPLOADS_TOTAL};
use crate::storage::{BlobStore, MEDIA_BUCKET};

/// Extension for a stored object, derived from the validated content type
///
/// The client-supplied file name never decides the extension.
fn file_extension(content_type: &str) -> String {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let known = match essence.as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/x-m4a" => Some("m4a"),
        "audio/ogg" => Some("ogg"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/webm" | "video/webm" => Some("webm"),
        "video/mp4" => Some("mp4"),
        "video/quicktime" => Some("mov"),
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    };
    if let Some(ext) = known {
        return ext.to_string();
    }

    let subtype = essence
        .split_once('/')
        .map(|(_, subtype)| subtype.trim_start_matches("x-"))
        .unwrap_or_default();
    if !subtype.is_empty() && subtype.chars().all(|c| c.is_ascii_alphanumeric()) {
        subtype.to_string()
    } else {
        "bin".to_string()
    }
}

/// Media uploader
pub struct MediaUploader {
    blobs: Arc<dyn BlobStore>,
    viewer: Option<String>,
    max_bytes: u64,
}

impl MediaUploader {
    pub fn new(blobs: Arc<dyn BlobStore>, viewer: Option<String>, max_bytes: u64) -> Self {
        Self {
            blobs,
            viewer,
            max_bytes,
        }
    }

    /// Upload an image, audio or video file for a post
    ///
    /// # Errors
    /// - `Unauthenticated` without a viewer
    /// - `Validation` for other MIME types or files over the size limit;
    ///   nothing is uploaded
    /// - the storage error
    pub async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<MediaRef, AppError> {
        let kind = MediaKind::from_mime(content_type).ok_or_else(|| {
            AppError::Validation("Please upload an audio, video or image file".to_string())
        })?;
        self.store(file_name, content_type, kind, bytes).await
    }

    /// Upload the audio clip of a status
    pub async fn upload_audio(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<MediaRef, AppError> {
        match MediaKind::from_mime(content_type) {
            Some(MediaKind::Audio) => {
                self.store(file_name, content_type, MediaKind::Audio, bytes)
                    .await
            }
            _ => Err(AppError::Validation(
                "Please upload an audio file".to_string(),
            )),
        }
    }

    async fn store(
        &self,
        file_name: &str,
        content_type: &str,
        kind: MediaKind,
        bytes: Vec<u8>,
    ) -> Result<MediaRef, AppError> {
        let viewer = self.viewer.as_deref().ok_or(AppError::Unauthenticated)?;

        let size = bytes.len() as u64;
        if size > self.max_bytes {
            let limit_mb = self.max_bytes / (1024 * 1024);
            return Err(AppError::Validation(format!(
                "Please upload a file smaller than {limit_mb}MB"
            )));
        }

        let path = format!(
            "{}/{}.{}",
            viewer,
            chrono::Utc::now().timestamp_millis(),
            file_extension(content_type)
        );

        self.blobs
            .upload(MEDIA_BUCKET, &path, bytes, content_type)
            .await
            .inspect_err(|error| tracing::error!(%error, path = %path, "Media upload failed"))?;

        MEDIA_UPLOADS_TOTAL.inc();
        MEDIA_BYTES_UPLOADED.inc_by(size as f64);
        tracing::info!(
            path = %path,
            file = file_name,
            kind = kind.as_str(),
            size,
            "Media uploaded"
        );

        Ok(MediaRef {
            url: self.blobs.public_url(MEDIA_BUCKET, &path),
            kind,
        })
    }
}
