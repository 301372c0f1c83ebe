//! Async delete cleanup (spec.md §4.8, second half): reacts to a blob
//! record's `deletedAt` transition by removing the backing object and the
//! record itself, and refunding META quota.
//!
//! The upstream change-stream mechanism is modeled as a trait
//! ([`ChangeStreamConsumer`]) rather than a concrete backend, matching the
//! trait-for-external-collaborator pattern used throughout [`crate::store`].
//! A bounded number of per-event retries (matching [`crate::store::retry`]'s
//! retry budget) precede routing to a [`DeadLetterSink`] so a systemic
//! failure never silently drops a cleanup forever, and never blocks the
//! consumer loop on one bad event (spec.md §9).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::store::object::ObjectStore;
use crate::store::{AttrUpdate, Condition, Key, MetadataStore, StoreError, TransactItem};

use super::types::BlobRecord;

/// One "record transitioned to has-deletedAt" notification.
#[derive(Debug, Clone)]
pub struct DeletionEvent {
    pub account_id: String,
    pub blob_id: String,
}

/// The upstream notification source (spec.md §4.8: "a change-stream
/// consumer watches the metadata store").
#[async_trait]
pub trait ChangeStreamConsumer: Send + Sync {
    async fn next_deletion(&self, cancel: &CancellationToken) -> Option<DeletionEvent>;
}

/// Where a cleanup event goes after exhausting its retry budget.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, event: DeletionEvent, reason: String);
}

const MAX_CLEANUP_ATTEMPTS: u32 = 3;

/// Idempotently cleans up one deleted blob: delete the object, delete the
/// record, refund META.
///
/// Delete-of-absent is tolerated at every step (spec.md §4.8), so replaying
/// this for an already-cleaned-up blob is a no-op rather than an error.
///
/// # Errors
///
/// Propagates the first unexpected store/object-store failure so the
/// caller's retry loop can count the attempt.
pub async fn cleanup_one(
    store: &dyn MetadataStore,
    objects: &dyn ObjectStore,
    event: &DeletionEvent,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let blob_key = Key::new(format!("ACCOUNT#{}", event.account_id), BlobRecord::blob_sk(&event.blob_id));
    let Some(item) = store.get(&blob_key, cancel).await? else {
        return Ok(());
    };
    let Some(record) = BlobRecord::from_item(&item) else {
        return Ok(());
    };
    if record.deleted_at.is_none() {
        return Ok(());
    }

    objects.delete(&record.s3_key, cancel).await?;

    let account_key = Key::new(format!("ACCOUNT#{}", event.account_id), super::types::AccountMeta::META_SK);
    let mut ops = vec![TransactItem::Delete { key: blob_key, condition: None }];
    if !record.size_unknown && record.size > 0 {
        #[allow(clippy::cast_precision_loss)]
        let updates = vec![AttrUpdate::Increment("quotaRemaining".into(), record.size as f64)];
        ops.push(TransactItem::Update { key: account_key, updates, condition: Some(Condition::Exists) });
    }

    match store.transact_write(ops, cancel).await {
        Ok(()) => Ok(()),
        // The record was already removed by a concurrent/replayed cleanup.
        Err(StoreError::ConditionFailed(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Drives the consumer loop: pulls events, retries each up to
/// [`MAX_CLEANUP_ATTEMPTS`] times, and routes exhausted events to the
/// dead-letter sink. Runs until the consumer yields `None` (shutdown) or
/// `cancel` fires.
pub async fn run_cleanup_loop(
    store: &dyn MetadataStore,
    objects: &dyn ObjectStore,
    consumer: &dyn ChangeStreamConsumer,
    dead_letters: &dyn DeadLetterSink,
    cancel: &CancellationToken,
) {
    while let Some(event) = consumer.next_deletion(cancel).await {
        if cancel.is_cancelled() {
            return;
        }
        let mut last_err = None;
        let mut succeeded = false;
        for attempt in 1..=MAX_CLEANUP_ATTEMPTS {
            match cleanup_one(store, objects, &event, cancel).await {
                Ok(()) => {
                    succeeded = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(attempt, account_id = %event.account_id, blob_id = %event.blob_id, error = %e, "cleanup attempt failed");
                    last_err = Some(e);
                }
            }
        }
        if !succeeded {
            let reason = last_err.map(|e| e.to_string()).unwrap_or_else(|| "exhausted retries".into());
            dead_letters.send(event, reason).await;
        }
    }
}
