//! In-memory [`ObjectStore`] for tests and local development, grounded on
//! the same `HashMapStorage` pattern as [`super::memory`].
//!
//! Uploads are simulated: `presign_upload`/`begin_multipart` return
//! deterministic `https://test-object-store.invalid/...` URLs, and a test
//! calls [`InMemoryObjectStore::simulate_upload`] (standing in for "the
//! client PUT the bytes") to actually populate the stored size before
//! confirmation logic can see it via `stat`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::object::{MultipartUpload, ObjectStoreError, PartUploadUrl, PresignedUploadUrl};
use super::ObjectStore;

#[derive(Default)]
struct State {
    sizes: HashMap<String, u64>,
    tags: HashMap<String, Vec<(String, String)>>,
    multipart_uploads: HashMap<String, u32>,
}

#[derive(Default)]
pub struct InMemoryObjectStore {
    state: Mutex<State>,
}

impl InMemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/demo hook standing in for "the client uploaded the bytes".
    pub fn simulate_upload(&self, object_key: &str, size: u64) {
        self.state.lock().sizes.insert(object_key.to_string(), size);
    }

    #[must_use]
    pub fn tags_of(&self, object_key: &str) -> Vec<(String, String)> {
        self.state.lock().tags.get(object_key).cloned().unwrap_or_default()
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), ObjectStoreError> {
    if cancel.is_cancelled() {
        Err(ObjectStoreError::Cancelled)
    } else {
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn presign_upload(
        &self,
        object_key: &str,
        expected_size: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<PresignedUploadUrl, ObjectStoreError> {
        check_cancelled(cancel)?;
        let size_param = expected_size.map_or_else(String::new, |s| format!("&expectedSize={s}"));
        Ok(PresignedUploadUrl {
            url: format!("https://test-object-store.invalid/put?key={object_key}{size_param}"),
            expires_in: Duration::from_secs(900),
        })
    }

    async fn put(&self, object_key: &str, bytes: &[u8], cancel: &CancellationToken) -> Result<(), ObjectStoreError> {
        check_cancelled(cancel)?;
        self.state.lock().sizes.insert(object_key.to_string(), bytes.len() as u64);
        Ok(())
    }

    async fn begin_multipart(
        &self,
        object_key: &str,
        part_count: u32,
        cancel: &CancellationToken,
    ) -> Result<MultipartUpload, ObjectStoreError> {
        check_cancelled(cancel)?;
        let upload_id = format!("upload-{object_key}-{part_count}");
        self.state.lock().multipart_uploads.insert(upload_id.clone(), part_count);
        let parts = (1..=part_count)
            .map(|part_number| PartUploadUrl {
                part_number,
                url: format!("https://test-object-store.invalid/put?key={object_key}&part={part_number}&uploadId={upload_id}"),
            })
            .collect();
        Ok(MultipartUpload { upload_id, parts })
    }

    async fn complete_multipart(
        &self,
        object_key: &str,
        upload_id: &str,
        parts: &[(u32, String)],
        cancel: &CancellationToken,
    ) -> Result<(), ObjectStoreError> {
        check_cancelled(cancel)?;
        let expected = self
            .state
            .lock()
            .multipart_uploads
            .get(upload_id)
            .copied()
            .ok_or_else(|| ObjectStoreError::NotFound(upload_id.to_string()))?;
        if parts.len() as u32 != expected {
            return Err(ObjectStoreError::Backend(anyhow::anyhow!(
                "expected {expected} parts, got {}",
                parts.len()
            )));
        }
        self.state.lock().multipart_uploads.remove(upload_id);
        // Simulated: the combined object's size is the part count times a
        // nominal per-part size, just enough for tests to observe "it exists".
        self.simulate_upload(object_key, u64::from(expected));
        Ok(())
    }

    async fn stat(&self, object_key: &str, cancel: &CancellationToken) -> Result<Option<u64>, ObjectStoreError> {
        check_cancelled(cancel)?;
        Ok(self.state.lock().sizes.get(object_key).copied())
    }

    async fn set_tags(
        &self,
        object_key: &str,
        tags: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<(), ObjectStoreError> {
        check_cancelled(cancel)?;
        self.state.lock().tags.insert(object_key.to_string(), tags.to_vec());
        Ok(())
    }

    async fn delete(&self, object_key: &str, cancel: &CancellationToken) -> Result<(), ObjectStoreError> {
        check_cancelled(cancel)?;
        let mut state = self.state.lock();
        state.sizes.remove(object_key);
        state.tags.remove(object_key);
        Ok(())
    }

    async fn presign_download(
        &self,
        object_key: &str,
        expires_in: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, ObjectStoreError> {
        check_cancelled(cancel)?;
        if !self.state.lock().sizes.contains_key(object_key) {
            return Err(ObjectStoreError::NotFound(object_key.to_string()));
        }
        Ok(format!(
            "https://test-object-store.invalid/get?key={object_key}&expiresIn={}",
            expires_in.as_secs()
        ))
    }
}
