//! Event-driven blob confirmation (spec.md §4.6). Invoked by a
//! [`crate::blob::cleanup::ChangeStreamConsumer`]-adjacent object-store
//! "object created" event, not by the client's HTTP response — this
//! decouples correctness from client behavior.
//!
//! The tag-then-record ordering below is the critical invariant: if the
//! object tag update succeeds but the metadata transaction fails, a retry
//! re-reads the blob record, re-applies the tag update idempotently, and
//! completes the transaction — no loss. The reverse order would let a
//! blob get reported confirmed, then have its tag update fail, then get
//! reaped by the pending-expiry sweep out from under it.

use tokio_util::sync::CancellationToken;

use crate::store::object::ObjectStore;
use crate::store::{AttrUpdate, Condition, Key, MetadataStore, StoreError, TransactItem};

use super::types::{now_millis, AccountMeta, BlobRecord, BlobStatus};

/// An "object created" event from the object store.
#[derive(Debug, Clone)]
pub struct ObjectCreatedEvent {
    pub object_key: String,
    pub observed_size: u64,
}

/// Outcome of processing one confirmation event, for callers (the stream
/// consumer) that want to log/count without inspecting internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    /// Blob record absent: a legacy direct-upload object, not a
    /// PUT-extension blob (spec.md §9 open question). Not an error.
    SkippedNoRecord,
    /// Already `confirmed`: idempotent replay (spec.md §8 invariant 4).
    SkippedAlreadyConfirmed,
}

/// Parses `{accountId}/{blobId}` out of an object-store key.
///
/// # Errors
///
/// Returns an error string if the key doesn't have exactly the two
/// expected path segments.
pub fn parse_object_key(object_key: &str) -> Result<(String, String), String> {
    let mut parts = object_key.splitn(2, '/');
    match (parts.next(), parts.next()) {
        (Some(account_id), Some(blob_id)) if !account_id.is_empty() && !blob_id.is_empty() => {
            Ok((account_id.to_string(), blob_id.to_string()))
        }
        _ => Err(format!("malformed object key: {object_key}")),
    }
}

/// Processes one confirmation event to completion (spec.md §4.6 steps 1-4).
///
/// # Errors
///
/// Returns an error only for unexpected store failures; a malformed key,
/// a missing blob record, or an already-confirmed record are all
/// non-error outcomes reported via [`ConfirmOutcome`].
pub async fn confirm(
    store: &dyn MetadataStore,
    objects: &dyn ObjectStore,
    event: &ObjectCreatedEvent,
    cancel: &CancellationToken,
) -> anyhow::Result<ConfirmOutcome> {
    let (account_id, blob_id) = match parse_object_key(&event.object_key) {
        Ok(pair) => pair,
        Err(reason) => {
            tracing::warn!(key = %event.object_key, reason, "malformed object key in confirmation event");
            return Ok(ConfirmOutcome::SkippedNoRecord);
        }
    };

    let blob_key = Key::new(format!("ACCOUNT#{account_id}"), BlobRecord::blob_sk(&blob_id));
    let Some(item) = store.get(&blob_key, cancel).await? else {
        tracing::debug!(%account_id, %blob_id, "no blob record for confirmation event, treating as legacy upload");
        return Ok(ConfirmOutcome::SkippedNoRecord);
    };
    let Some(record) = BlobRecord::from_item(&item) else {
        tracing::warn!(%account_id, %blob_id, "blob record failed to parse, skipping confirmation");
        return Ok(ConfirmOutcome::SkippedNoRecord);
    };
    if record.status == BlobStatus::Confirmed {
        return Ok(ConfirmOutcome::SkippedAlreadyConfirmed);
    }

    objects
        .set_tags(&event.object_key, &[("Status".into(), "confirmed".into()), ("Account".into(), account_id.clone())], cancel)
        .await?;

    let now = now_millis();
    let account_key = Key::new(format!("ACCOUNT#{account_id}"), AccountMeta::META_SK);

    let mut blob_updates = vec![
        AttrUpdate::Set("status".into(), serde_json::json!(BlobStatus::Confirmed.as_str())),
        AttrUpdate::Set("confirmedAt".into(), serde_json::json!(now)),
        AttrUpdate::Remove("gsi1pk".into()),
        AttrUpdate::Remove("gsi1sk".into()),
    ];
    let mut meta_updates = Vec::new();
    if record.size_unknown {
        blob_updates.push(AttrUpdate::Set("size".into(), serde_json::json!(event.observed_size)));
        blob_updates.push(AttrUpdate::Remove("sizeUnknown".into()));
        #[allow(clippy::cast_precision_loss)]
        meta_updates.push(AttrUpdate::Increment("quotaRemaining".into(), -(event.observed_size as f64)));
    }
    if !record.iam_auth {
        meta_updates.push(AttrUpdate::Increment("pendingAllocationsCount".into(), -1.0));
    }
    meta_updates.push(AttrUpdate::Set("updatedAt".into(), serde_json::json!(now)));

    let mut ops = vec![TransactItem::Update {
        key: blob_key,
        updates: blob_updates,
        condition: Some(Condition::AttrEquals("status".into(), serde_json::json!(BlobStatus::Pending.as_str()))),
    }];
    if !meta_updates.is_empty() {
        ops.push(TransactItem::Update { key: account_key, updates: meta_updates, condition: Some(Condition::Exists) });
    }

    match store.transact_write(ops, cancel).await {
        Ok(()) => Ok(ConfirmOutcome::Confirmed),
        // Another worker already confirmed it between our read and write.
        Err(StoreError::ConditionFailed(_)) => Ok(ConfirmOutcome::SkippedAlreadyConfirmed),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryMetadataStore;
    use crate::store::object_memory::InMemoryObjectStore;
    use crate::store::Condition as Cond;

    async fn seed_pending_blob(store: &InMemoryMetadataStore, account: &str, blob: &str, size_unknown: bool) {
        let record = BlobRecord {
            blob_id: blob.to_string(),
            account_id: account.to_string(),
            size: 0,
            content_type: "application/octet-stream".into(),
            s3_key: format!("{account}/{blob}"),
            created_at: now_millis(),
            confirmed_at: None,
            deleted_at: None,
            status: BlobStatus::Pending,
            size_unknown,
            iam_auth: false,
            multipart: false,
            upload_id: None,
            url_expires_at: Some(now_millis() + 900_000),
        };
        store
            .put_conditional(
                &Key::new(format!("ACCOUNT#{account}"), BlobRecord::blob_sk(blob)),
                record.to_item(),
                Some(Cond::NotExists),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let meta = AccountMeta { account_id: account.to_string(), quota_bytes: 1000, quota_remaining: 1000, pending_allocations_count: 1, created_at: now_millis(), updated_at: now_millis() };
        store
            .put_conditional(&Key::new(format!("ACCOUNT#{account}"), AccountMeta::META_SK), meta.to_item(), Some(Cond::NotExists), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn confirms_known_size_blob_and_decrements_pending() {
        let store = InMemoryMetadataStore::new();
        let objects = InMemoryObjectStore::new();
        let cancel = CancellationToken::new();
        seed_pending_blob(&store, "a1", "b1", false).await;

        let event = ObjectCreatedEvent { object_key: "a1/b1".into(), observed_size: 400 };
        let outcome = confirm(&store, &objects, &event, &cancel).await.unwrap();
        assert_eq!(outcome, ConfirmOutcome::Confirmed);

        let blob_item = store.get(&Key::new("ACCOUNT#a1", BlobRecord::blob_sk("b1")), &cancel).await.unwrap().unwrap();
        let record = BlobRecord::from_item(&blob_item).unwrap();
        assert_eq!(record.status, BlobStatus::Confirmed);
        assert!(!blob_item.contains_key("gsi1pk"));

        let meta_item = store.get(&Key::new("ACCOUNT#a1", AccountMeta::META_SK), &cancel).await.unwrap().unwrap();
        let meta = AccountMeta::from_item("a1", &meta_item).unwrap();
        assert_eq!(meta.pending_allocations_count, 0);
        assert_eq!(meta.quota_remaining, 1000);
    }

    #[tokio::test]
    async fn unknown_size_blob_deducts_observed_size_on_confirm() {
        let store = InMemoryMetadataStore::new();
        let objects = InMemoryObjectStore::new();
        let cancel = CancellationToken::new();
        seed_pending_blob(&store, "a1", "b1", true).await;

        let event = ObjectCreatedEvent { object_key: "a1/b1".into(), observed_size: 250 };
        confirm(&store, &objects, &event, &cancel).await.unwrap();

        let meta_item = store.get(&Key::new("ACCOUNT#a1", AccountMeta::META_SK), &cancel).await.unwrap().unwrap();
        let meta = AccountMeta::from_item("a1", &meta_item).unwrap();
        assert_eq!(meta.quota_remaining, 750);
    }

    #[tokio::test]
    async fn replaying_confirmation_is_idempotent() {
        let store = InMemoryMetadataStore::new();
        let objects = InMemoryObjectStore::new();
        let cancel = CancellationToken::new();
        seed_pending_blob(&store, "a1", "b1", false).await;

        let event = ObjectCreatedEvent { object_key: "a1/b1".into(), observed_size: 400 };
        confirm(&store, &objects, &event, &cancel).await.unwrap();
        let second = confirm(&store, &objects, &event, &cancel).await.unwrap();
        assert_eq!(second, ConfirmOutcome::SkippedAlreadyConfirmed);

        let meta_item = store.get(&Key::new("ACCOUNT#a1", AccountMeta::META_SK), &cancel).await.unwrap().unwrap();
        let meta = AccountMeta::from_item("a1", &meta_item).unwrap();
        assert_eq!(meta.pending_allocations_count, 0);
    }

    #[tokio::test]
    async fn missing_blob_record_is_skipped_not_errored() {
        let store = InMemoryMetadataStore::new();
        let objects = InMemoryObjectStore::new();
        let cancel = CancellationToken::new();
        let event = ObjectCreatedEvent { object_key: "a1/legacy-upload".into(), observed_size: 10 };
        let outcome = confirm(&store, &objects, &event, &cancel).await.unwrap();
        assert_eq!(outcome, ConfirmOutcome::SkippedNoRecord);
    }
}
