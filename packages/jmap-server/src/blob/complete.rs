//! `Blob/complete` (spec.md §6, RFC 9404): finalizes a multipart upload
//! from client-reported per-part ETags. Does not itself transition the
//! blob record to confirmed — that happens when the resulting
//! object-created event reaches [`super::confirm::confirm`].

use tokio_util::sync::CancellationToken;

use jmap_core::MethodError;

use crate::store::object::ObjectStore;
use crate::store::{Key, MetadataStore};

use super::types::BlobRecord;

/// `Blob/complete` args: accountId, blob id, and per-part ETags.
#[derive(Debug, Clone)]
pub struct CompleteInput {
    pub account_id: String,
    pub blob_id: String,
    pub parts: Vec<(u32, String)>,
}

/// Runs `Blob/complete` for one blob.
///
/// # Errors
///
/// `notFound` if the blob doesn't exist or belongs to a different
/// account; `invalidArguments` if it isn't a pending multipart upload;
/// `serverFail` on an unexpected object-store failure.
pub async fn complete(
    store: &dyn MetadataStore,
    objects: &dyn ObjectStore,
    input: CompleteInput,
    cancel: &CancellationToken,
) -> Result<(), MethodError> {
    let key = Key::new(format!("ACCOUNT#{}", input.account_id), BlobRecord::blob_sk(&input.blob_id));
    let item = store.get(&key, cancel).await.map_err(|e| MethodError::server_fail(e.to_string()))?;
    let record = item.as_ref().and_then(BlobRecord::from_item).filter(|r| r.account_id == input.account_id);
    let Some(record) = record else { return Err(MethodError::NotFound) };

    if !record.multipart || record.status != super::types::BlobStatus::Pending {
        return Err(MethodError::invalid_arguments_because("blob is not a pending multipart upload"));
    }
    let Some(upload_id) = record.upload_id.as_deref() else {
        return Err(MethodError::server_fail("multipart record missing uploadId"));
    };

    objects
        .complete_multipart(&record.s3_key, upload_id, &input.parts, cancel)
        .await
        .map_err(|e| MethodError::server_fail(e.to_string()))
}
