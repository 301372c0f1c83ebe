//! Legacy direct-body upload (RFC 8620 §6.1, spec.md §6 `POST
//! /upload/{accountId}`). Unlike `Blob/allocate`, the server receives the
//! body itself over this connection, so there's no pending/confirm split:
//! the blob is created already `Confirmed`, in one conditional transaction
//! against the account's quota, the same invariant `allocate` enforces
//! (spec.md §8 invariant 1) just without the pending-allocation slot.

use tokio_util::sync::CancellationToken;

use jmap_core::MethodError;

use crate::store::object::{object_key_for, ObjectStore, ObjectStoreError};
use crate::store::{AttrUpdate, Condition, Key, MetadataStore, StoreError, TransactItem};

use super::types::{blob_id_new, now_millis, validate_content_type, AccountMeta, BlobRecord, BlobStatus};

/// One direct-upload request.
#[derive(Debug, Clone)]
pub struct UploadInput {
    pub account_id: String,
    pub content_type: String,
    pub body: Vec<u8>,
    pub is_iam_auth: bool,
    /// The validated `X-Parent` header value, if the client sent one
    /// (spec.md §3/§6): folded into the object's `Parent` tag.
    pub parent: Option<String>,
}

/// The created blob, as reported in the 201 response body.
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub blob_id: String,
    pub content_type: String,
    pub size: u64,
}

fn object_store_error(err: ObjectStoreError) -> MethodError {
    MethodError::server_fail(err.to_string())
}

/// Runs the full direct-upload path: validate, store bytes, then create an
/// already-`Confirmed` record while deducting quota in the same
/// conditional transaction.
///
/// # Errors
///
/// Returns `invalidArguments`/`invalidProperties` for a malformed content
/// type, `overQuota` if the account lacks capacity, `accountNotProvisioned`
/// if no account META record exists, and propagates unexpected store or
/// object-store failures as `serverFail`.
pub async fn upload(
    store: &dyn MetadataStore,
    objects: &dyn ObjectStore,
    input: UploadInput,
    cancel: &CancellationToken,
) -> Result<UploadResult, MethodError> {
    validate_content_type(&input.content_type)?;

    let size = input.body.len() as u64;
    let blob_id = blob_id_new();
    let object_key = object_key_for(&input.account_id, &blob_id);
    let now = now_millis();

    objects.put(&object_key, &input.body, cancel).await.map_err(object_store_error)?;
    let mut tags = vec![("Status".to_string(), "confirmed".to_string()), ("Account".to_string(), input.account_id.clone())];
    if let Some(parent) = &input.parent {
        tags.push(("Parent".to_string(), parent.clone()));
    }
    objects.set_tags(&object_key, &tags, cancel).await.map_err(object_store_error)?;

    let record = BlobRecord {
        blob_id: blob_id.to_string(),
        account_id: input.account_id.clone(),
        size,
        content_type: input.content_type.clone(),
        s3_key: object_key,
        created_at: now,
        confirmed_at: Some(now),
        deleted_at: None,
        status: BlobStatus::Confirmed,
        size_unknown: false,
        iam_auth: input.is_iam_auth,
        multipart: false,
        upload_id: None,
        url_expires_at: None,
    };

    let account_key = Key::new(format!("ACCOUNT#{}", input.account_id), AccountMeta::META_SK);
    let blob_key = Key::new(format!("ACCOUNT#{}", input.account_id), BlobRecord::blob_sk(&blob_id.to_string()));

    #[allow(clippy::cast_precision_loss)]
    let meta_updates =
        vec![AttrUpdate::Set("updatedAt".into(), serde_json::json!(now)), AttrUpdate::Increment("quotaRemaining".into(), -(size as f64))];
    let meta_condition = Condition::And(vec![Condition::Exists, Condition::AttrGreaterOrEqual("quotaRemaining".into(), size as f64)]);

    let ops = vec![
        TransactItem::Put { key: blob_key, item: record.to_item(), condition: Some(Condition::NotExists) },
        TransactItem::Update { key: account_key.clone(), updates: meta_updates, condition: Some(meta_condition) },
    ];

    match store.transact_write(ops, cancel).await {
        Ok(()) => Ok(UploadResult { blob_id: blob_id.to_string(), content_type: input.content_type, size }),
        Err(StoreError::ConditionFailed(_)) => {
            let meta = store
                .get(&account_key, cancel)
                .await
                .ok()
                .flatten()
                .and_then(|item| AccountMeta::from_item(&input.account_id, &item));
            match meta {
                None => Err(MethodError::AccountNotProvisioned),
                Some(_) => Err(MethodError::OverQuota),
            }
        }
        Err(_) => Err(MethodError::server_fail("upload store write failed")),
    }
}
