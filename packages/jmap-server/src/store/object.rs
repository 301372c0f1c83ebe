//! Object store abstraction (spec.md §4.2): the out-of-scope backing
//! object storage and its pre-signed URL issuance, modeled as a trait so
//! the blob lifecycle logic doesn't need a concrete client.
//!
//! Grounded on the teacher's `MapProvider` trait (`traits.rs`): an
//! `async_trait` abstracting a backing resource whose concrete type the
//! rest of the system never needs to know.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use jmap_core::BlobId;

/// A single-PUT pre-signed upload URL and the deadline it's valid until.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUploadUrl {
    pub url: String,
    pub expires_in: Duration,
}

/// A pre-signed URL for one part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartUploadUrl {
    pub part_number: u32,
    pub url: String,
}

/// The result of beginning a multipart upload: the object store's own
/// upload id (needed again at `Blob/complete`) plus a pre-signed URL per
/// part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartUpload {
    pub upload_id: String,
    pub parts: Vec<PartUploadUrl>,
}

/// Errors surfaced by the object store.
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// The out-of-scope backing object storage (spec.md §1 names "the object
/// storage service" as an external collaborator). Every operation takes
/// the object key the blob allocation assigned it, not the `BlobId` the
/// client sees, since the two are related but not required to be equal
/// (spec.md §3: object key format is an implementation detail).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Issues a pre-signed URL for a direct single-PUT upload.
    async fn presign_upload(
        &self,
        object_key: &str,
        expected_size: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<PresignedUploadUrl, ObjectStoreError>;

    /// Stores `bytes` directly under `object_key`, for the legacy
    /// server-mediated upload endpoint (spec.md §6 `POST /upload/{accountId}`),
    /// which receives the body itself rather than handing out a pre-signed
    /// URL for the client to PUT to.
    async fn put(&self, object_key: &str, bytes: &[u8], cancel: &CancellationToken) -> Result<(), ObjectStoreError>;

    /// Begins a multipart upload, returning its upload id and pre-signed
    /// URLs for each part.
    async fn begin_multipart(
        &self,
        object_key: &str,
        part_count: u32,
        cancel: &CancellationToken,
    ) -> Result<MultipartUpload, ObjectStoreError>;

    /// Finalizes a multipart upload from the client-reported per-part
    /// ETags (spec.md §6 `Blob/complete`).
    async fn complete_multipart(
        &self,
        object_key: &str,
        upload_id: &str,
        parts: &[(u32, String)],
        cancel: &CancellationToken,
    ) -> Result<(), ObjectStoreError>;

    /// Returns the actual stored size, or `None` if the object does not
    /// exist yet (spec.md §4.6: confirmation checks object existence and
    /// size before trusting the client-declared size).
    async fn stat(&self, object_key: &str, cancel: &CancellationToken) -> Result<Option<u64>, ObjectStoreError>;

    /// Attaches/updates lifecycle tags on the object (spec.md §4.6's
    /// tag-then-record ordering: the object is tagged `confirmed` before
    /// the metadata record is).
    async fn set_tags(
        &self,
        object_key: &str,
        tags: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<(), ObjectStoreError>;

    async fn delete(&self, object_key: &str, cancel: &CancellationToken) -> Result<(), ObjectStoreError>;

    /// A time-limited signed download URL for the CDN-fronted path
    /// (spec.md §4.9).
    async fn presign_download(
        &self,
        object_key: &str,
        expires_in: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, ObjectStoreError>;
}

/// Derives the canonical object key for a blob. Kept alongside the trait
/// since both the allocator and the in-memory test store need the exact
/// same derivation to agree on what "the object" is.
#[must_use]
pub fn object_key_for(account_id: &str, blob_id: &BlobId) -> String {
    format!("{account_id}/{}", blob_id.as_str())
}
