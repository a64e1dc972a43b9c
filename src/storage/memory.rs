//! In-process blob store

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{BlobStore, encode_path};
use crate::error::AppError;

/// Stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Blob store held in memory
///
/// Keeps every upload keyed by `bucket/path`. Uploads can be made to fail
/// with [`MemoryBlobStore::fail_uploads`].
#[derive(Debug)]
pub struct MemoryBlobStore {
    base_url: String,
    objects: Mutex<HashMap<String, StoredObject>>,
    failing: Mutex<bool>,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

impl MemoryBlobStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            objects: Mutex::new(HashMap::new()),
            failing: Mutex::new(false),
        }
    }

    pub fn fail_uploads(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(&format!("{bucket}/{path}")).cloned())
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), AppError> {
        if self.failing.lock().map(|flag| *flag).unwrap_or(false) {
            return Err(AppError::Storage("simulated upload failure".to_string()));
        }

        let mut objects = self
            .objects
            .lock()
            .map_err(|_| AppError::Storage("blob store poisoned".to_string()))?;
        objects.insert(
            format!("{bucket}/{path}"),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, bucket, encode_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_is_retrievable() {
        let store = MemoryBlobStore::default();
        store
            .upload("media", "u1/1.mp3", vec![1, 2, 3], "audio/mpeg")
            .await
            .unwrap();

        let object = store.object("media", "u1/1.mp3").unwrap();
        assert_eq!(object.bytes, vec![1, 2, 3]);
        assert_eq!(object.content_type, "audio/mpeg");
    }

    #[tokio::test]
    async fn failing_upload_stores_nothing() {
        let store = MemoryBlobStore::default();
        store.fail_uploads(true);
        let result = store.upload("media", "u1/1.mp3", vec![1], "audio/mpeg").await;
        assert!(matches!(result, Err(AppError::Storage(_))));
        assert!(store.is_empty());
    }
}
