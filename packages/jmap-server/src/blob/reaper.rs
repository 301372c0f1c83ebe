//! Pending-allocation expiry reaper (spec.md §4.7): a periodic task that
//! reclaims quota and pending-slot capacity for allocations the client
//! never uploaded against.
//!
//! Takes `now`/`grace` as explicit parameters rather than reading the wall
//! clock internally, so a single sweep's behavior is fully reproducible in
//! a test. The caller (the binary's background task, per
//! `SPEC_FULL.md`'s `REAPER_INTERVAL_SECONDS`) is what actually drives the
//! clock and the repeat interval.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::store::object::ObjectStore;
use crate::store::{AttrUpdate, Condition, IndexName, Key, MetadataStore, QuerySpec, StoreError, TransactItem};

use super::types::{BlobRecord, BlobStatus};

/// One sweep's summary, for the caller to log/emit metrics from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapSummary {
    pub candidates: usize,
    pub reaped: usize,
    pub skipped_object_present: usize,
}

/// Runs one reaper sweep: finds every pending allocation whose
/// `urlExpiresAt` is at or before `now - grace`, and for each whose
/// backing object is still absent, deletes the blob record and refunds
/// META.
///
/// # Errors
///
/// Propagates the first unexpected store/object-store failure. A single
/// candidate's `ConditionFailed` (another worker reaped or confirmed it
/// first) is treated as a benign skip, not an error.
pub async fn reap_expired_pending(
    store: &dyn MetadataStore,
    objects: &dyn ObjectStore,
    now: i64,
    grace: Duration,
    cancel: &CancellationToken,
) -> anyhow::Result<ReapSummary> {
    #[allow(clippy::cast_possible_wrap)]
    let grace_ms = grace.as_millis() as i64;
    let cutoff = now - grace_ms;
    // `~` sorts after every character a generated account/blob id or the
    // `#` separator can contain, so this bound includes every record whose
    // expiry timestamp is exactly `cutoff`, not just strictly earlier ones.
    let sk_le = format!("EXPIRES#{:020}~", cutoff.max(0));

    let items = store
        .query(QuerySpec::Index { index: IndexName::Gsi1, pk: "PENDING".into(), sk_le: Some(sk_le), sk_ge: None }, cancel)
        .await?;

    let mut summary = ReapSummary { candidates: items.len(), ..ReapSummary::default() };

    for item in items {
        let Some(record) = BlobRecord::from_item(&item) else { continue };
        if record.status != BlobStatus::Pending {
            continue;
        }
        let object_key = record.s3_key.clone();
        let still_uploading = objects.stat(&object_key, cancel).await?.is_some();
        if still_uploading {
            summary.skipped_object_present += 1;
            continue;
        }

        let blob_key = Key::new(format!("ACCOUNT#{}", record.account_id), BlobRecord::blob_sk(&record.blob_id));
        let account_key = Key::new(format!("ACCOUNT#{}", record.account_id), super::types::AccountMeta::META_SK);

        let mut meta_updates = Vec::new();
        if !record.iam_auth {
            meta_updates.push(AttrUpdate::Increment("pendingAllocationsCount".into(), -1.0));
        }
        if !record.size_unknown {
            #[allow(clippy::cast_precision_loss)]
            meta_updates.push(AttrUpdate::Increment("quotaRemaining".into(), record.size as f64));
        }

        let mut ops = vec![TransactItem::Delete {
            key: blob_key,
            condition: Some(Condition::AttrEquals("status".into(), serde_json::json!(BlobStatus::Pending.as_str()))),
        }];
        if !meta_updates.is_empty() {
            ops.push(TransactItem::Update { key: account_key, updates: meta_updates, condition: Some(Condition::Exists) });
        }

        match store.transact_write(ops, cancel).await {
            Ok(()) => summary.reaped += 1,
            // Confirmed or reaped concurrently between the query and this write.
            Err(StoreError::ConditionFailed(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryMetadataStore;
    use crate::store::object_memory::InMemoryObjectStore;
    use crate::store::Condition as Cond;
    use super::super::types::AccountMeta;

    async fn seed(store: &InMemoryMetadataStore, account: &str, blob: &str, expires_at: i64, size_unknown: bool, iam: bool) {
        let record = BlobRecord {
            blob_id: blob.to_string(),
            account_id: account.to_string(),
            size: 100,
            content_type: "application/octet-stream".into(),
            s3_key: format!("{account}/{blob}"),
            created_at: expires_at - 900_000,
            confirmed_at: None,
            deleted_at: None,
            status: BlobStatus::Pending,
            size_unknown,
            iam_auth: iam,
            multipart: false,
            upload_id: None,
            url_expires_at: Some(expires_at),
        };
        store
            .put_conditional(&Key::new(format!("ACCOUNT#{account}"), BlobRecord::blob_sk(blob)), record.to_item(), Some(Cond::NotExists), &CancellationToken::new())
            .await
            .unwrap();
        let meta = AccountMeta { account_id: account.to_string(), quota_bytes: 1000, quota_remaining: 900, pending_allocations_count: 1, created_at: 0, updated_at: 0 };
        store
            .put_conditional(&Key::new(format!("ACCOUNT#{account}"), AccountMeta::META_SK), meta.to_item(), Some(Cond::NotExists), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn expired_pending_without_object_is_reaped_and_meta_refunded() {
        let store = InMemoryMetadataStore::new();
        let objects = InMemoryObjectStore::new();
        let cancel = CancellationToken::new();
        seed(&store, "a1", "b1", 1_000_000, false, false).await;

        let summary = reap_expired_pending(&store, &objects, 1_000_000 + 72 * 3_600_000 + 1, Duration::from_secs(72 * 3600), &cancel).await.unwrap();
        assert_eq!(summary.reaped, 1);

        assert!(store.get(&Key::new("ACCOUNT#a1", BlobRecord::blob_sk("b1")), &cancel).await.unwrap().is_none());
        let meta_item = store.get(&Key::new("ACCOUNT#a1", AccountMeta::META_SK), &cancel).await.unwrap().unwrap();
        let meta = AccountMeta::from_item("a1", &meta_item).unwrap();
        assert_eq!(meta.quota_remaining, 1000);
        assert_eq!(meta.pending_allocations_count, 0);
    }

    #[tokio::test]
    async fn expired_pending_with_present_object_is_not_reaped() {
        let store = InMemoryMetadataStore::new();
        let objects = InMemoryObjectStore::new();
        let cancel = CancellationToken::new();
        seed(&store, "a1", "b1", 1_000_000, false, false).await;
        objects.simulate_upload("a1/b1", 100);

        let summary = reap_expired_pending(&store, &objects, 1_000_000 + 72 * 3_600_000 + 1, Duration::from_secs(72 * 3600), &cancel).await.unwrap();
        assert_eq!(summary.reaped, 0);
        assert_eq!(summary.skipped_object_present, 1);
        assert!(store.get(&Key::new("ACCOUNT#a1", BlobRecord::blob_sk("b1")), &cancel).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn not_yet_expired_pending_is_not_a_candidate() {
        let store = InMemoryMetadataStore::new();
        let objects = InMemoryObjectStore::new();
        let cancel = CancellationToken::new();
        seed(&store, "a1", "b1", 1_000_000, false, false).await;

        let summary = reap_expired_pending(&store, &objects, 1_000_000, Duration::from_secs(72 * 3600), &cancel).await.unwrap();
        assert_eq!(summary.candidates, 0);
    }
}
