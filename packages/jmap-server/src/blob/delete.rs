//! Blob deletion (spec.md §4.8, first half): a client-visible conditional
//! tombstone write. The actual object/record removal and quota refund
//! happen asynchronously in [`super::cleanup`], driven off the
//! `deletedAt` transition this function creates — deletion here is a
//! single fast conditional write, not a distributed multi-step operation.

use tokio_util::sync::CancellationToken;

use jmap_core::MethodError;

use crate::store::{AttrUpdate, Condition, Key, MetadataStore, StoreError, TransactItem};

use super::types::{now_millis, BlobRecord};

/// Marks a blob deleted on behalf of `auth_account_id`.
///
/// Deliberately returns `notFound` both when the blob truly doesn't exist
/// and when it exists but belongs to a different account: leaking "it
/// exists, but you can't touch it" via a `forbidden` would let a caller
/// enumerate other accounts' blob ids (spec.md §4.8).
///
/// # Errors
///
/// `notFound` if the blob doesn't exist, isn't owned by `auth_account_id`,
/// or was already deleted. Propagates unexpected store failures.
pub async fn delete(
    store: &dyn MetadataStore,
    auth_account_id: &str,
    blob_id: &str,
    cancel: &CancellationToken,
) -> Result<(), MethodError> {
    let key = Key::new(format!("ACCOUNT#{auth_account_id}"), BlobRecord::blob_sk(blob_id));
    // `AttrAbsentOr(attr, Or([]))`: true when `attr` is absent, false
    // otherwise (the inner `Or` of zero clauses is vacuously false) — the
    // idiom this store's `Condition` enum uses for "attribute not set".
    let condition = Condition::And(vec![
        Condition::Exists,
        Condition::AttrAbsentOr("deletedAt".into(), Box::new(Condition::Or(Vec::new()))),
        Condition::AttrEquals("accountId".into(), serde_json::json!(auth_account_id)),
    ]);
    let updates = vec![AttrUpdate::Set("deletedAt".into(), serde_json::json!(now_millis()))];
    let op = TransactItem::Update { key, updates, condition: Some(condition) };

    match store.transact_write(vec![op], cancel).await {
        Ok(()) => Ok(()),
        Err(StoreError::ConditionFailed(_)) => Err(MethodError::NotFound),
        Err(_) => Err(MethodError::server_fail("delete store write failed")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryMetadataStore;
    use crate::store::Condition as Cond;
    use crate::blob::types::{AccountMeta, BlobStatus};

    async fn seed_blob(store: &InMemoryMetadataStore, account: &str, blob: &str) {
        let record = BlobRecord {
            blob_id: blob.to_string(),
            account_id: account.to_string(),
            size: 100,
            content_type: "application/octet-stream".into(),
            s3_key: format!("{account}/{blob}"),
            created_at: now_millis(),
            confirmed_at: Some(now_millis()),
            deleted_at: None,
            status: BlobStatus::Confirmed,
            size_unknown: false,
            iam_auth: false,
            multipart: false,
            upload_id: None,
            url_expires_at: None,
        };
        store
            .put_conditional(&Key::new(format!("ACCOUNT#{account}"), BlobRecord::blob_sk(blob)), record.to_item(), Some(Cond::NotExists), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn owner_can_delete_their_blob() {
        let store = InMemoryMetadataStore::new();
        let cancel = CancellationToken::new();
        seed_blob(&store, "a1", "b1").await;

        delete(&store, "a1", "b1", &cancel).await.unwrap();

        let item = store.get(&Key::new("ACCOUNT#a1", BlobRecord::blob_sk("b1")), &cancel).await.unwrap().unwrap();
        assert!(item.contains_key("deletedAt"));
    }

    #[tokio::test]
    async fn deleting_someone_elses_blob_is_not_found() {
        let store = InMemoryMetadataStore::new();
        let cancel = CancellationToken::new();
        seed_blob(&store, "a1", "b1").await;

        let err = delete(&store, "a2", "b1", &cancel).await.unwrap_err();
        assert!(matches!(err, MethodError::NotFound));

        let item = store.get(&Key::new("ACCOUNT#a1", BlobRecord::blob_sk("b1")), &cancel).await.unwrap().unwrap();
        assert!(!item.contains_key("deletedAt"));
    }

    #[tokio::test]
    async fn deleting_missing_blob_is_not_found() {
        let store = InMemoryMetadataStore::new();
        let cancel = CancellationToken::new();
        let err = delete(&store, "a1", "missing", &cancel).await.unwrap_err();
        assert!(matches!(err, MethodError::NotFound));
    }

    #[tokio::test]
    async fn deleting_twice_is_not_found_on_the_second_call() {
        let store = InMemoryMetadataStore::new();
        let cancel = CancellationToken::new();
        seed_blob(&store, "a1", "b1").await;
        delete(&store, "a1", "b1", &cancel).await.unwrap();
        let err = delete(&store, "a1", "b1", &cancel).await.unwrap_err();
        assert!(matches!(err, MethodError::NotFound));
    }
}
