//! Allocation coordinator (spec.md §4.5): validates a `Blob/allocate`
//! request, issues pre-signed upload URL(s), and atomically reserves
//! quota + pending-slot capacity.

use tokio_util::sync::CancellationToken;

use jmap_core::MethodError;

use crate::store::object::{object_key_for, MultipartUpload, ObjectStore, ObjectStoreError, PresignedUploadUrl};
use crate::store::{AttrUpdate, Condition, Key, MetadataStore, StoreError, TransactItem};

use super::types::{account_id, blob_id_new, now_millis, validate_content_type, AccountMeta, BlobRecord, BlobStatus};

/// Everything `Blob/allocate` needs besides `AllocateInput` (spec.md §6's
/// `JMAP_DISPATCHER_PARALLELISM`-adjacent config block).
#[derive(Debug, Clone)]
pub struct AllocateConfig {
    pub max_size_upload_put: u64,
    pub max_pending_allocations: i64,
    pub allocation_url_expiry_seconds: u64,
    pub multipart_part_count: u32,
}

impl Default for AllocateConfig {
    fn default() -> Self {
        Self {
            max_size_upload_put: 250 * 1024 * 1024,
            max_pending_allocations: 4,
            allocation_url_expiry_seconds: 900,
            multipart_part_count: 100,
        }
    }
}

/// One `create.{creationId}` entry of a `Blob/allocate` call.
#[derive(Debug, Clone)]
pub struct AllocateInput {
    pub account_id: String,
    pub content_type: String,
    pub size: Option<u64>,
    pub size_unknown: bool,
    pub multipart: bool,
    pub is_iam_auth: bool,
}

/// Per-RFC-9404 success shape for one `created.{creationId}` entry.
#[derive(Debug, Clone)]
pub enum AllocateResult {
    Single { blob_id: String, content_type: String, size: u64, url: String, expires: i64 },
    Multipart { blob_id: String, content_type: String, parts: Vec<crate::store::object::PartUploadUrl>, expires: i64 },
}

fn validate(input: &AllocateInput, config: &AllocateConfig) -> Result<(), MethodError> {
    if input.multipart && !input.size_unknown {
        return Err(MethodError::invalid_arguments_because("multipart requires sizeUnknown"));
    }
    if !input.size_unknown {
        match input.size {
            None => return Err(MethodError::invalid_arguments_because("size is required unless sizeUnknown")),
            Some(0) => return Err(MethodError::invalid_arguments_because("size must be > 0")),
            Some(size) if size > config.max_size_upload_put => return Err(MethodError::TooLarge),
            Some(_) => {}
        }
    }
    validate_content_type(&input.content_type)
}

fn diagnose_condition_failure(meta: Option<&AccountMeta>, input: &AllocateInput, config: &AllocateConfig) -> MethodError {
    let Some(meta) = meta else {
        return MethodError::AccountNotProvisioned;
    };
    if !input.is_iam_auth && meta.pending_allocations_count >= config.max_pending_allocations {
        return MethodError::TooManyPending;
    }
    if let Some(size) = input.size {
        #[allow(clippy::cast_possible_wrap)]
        if meta.quota_remaining < size as i64 {
            return MethodError::OverQuota;
        }
    }
    MethodError::server_fail("concurrent modification race during allocation")
}

/// Runs the full `Blob/allocate` coordinator for one creation entry.
///
/// # Errors
///
/// Returns the JMAP error for the corresponding `notCreated` entry on any
/// validation failure, quota/pending exhaustion, or unexpected race.
pub async fn allocate(
    store: &dyn MetadataStore,
    objects: &dyn ObjectStore,
    input: AllocateInput,
    config: &AllocateConfig,
    cancel: &CancellationToken,
) -> Result<AllocateResult, MethodError> {
    validate(&input, config)?;

    let blob_id = blob_id_new();
    let object_key = object_key_for(&input.account_id, &blob_id);
    let now = now_millis();

    #[allow(clippy::cast_possible_wrap)]
    let allocation_expiry_ms = config.allocation_url_expiry_seconds as i64 * 1000;

    let (result, url_expires_at, multipart, upload_id) = if input.multipart {
        let MultipartUpload { upload_id, parts } = objects
            .begin_multipart(&object_key, config.multipart_part_count, cancel)
            .await
            .map_err(object_store_error)?;
        let expires_at = now + allocation_expiry_ms;
        (
            AllocateResult::Multipart {
                blob_id: blob_id.to_string(),
                content_type: input.content_type.clone(),
                parts,
                expires: expires_at,
            },
            expires_at,
            true,
            Some(upload_id),
        )
    } else {
        let PresignedUploadUrl { url, expires_in } =
            objects.presign_upload(&object_key, input.size, cancel).await.map_err(object_store_error)?;
        #[allow(clippy::cast_possible_wrap)]
        let expires_at = now + expires_in.as_millis() as i64;
        (
            AllocateResult::Single {
                blob_id: blob_id.to_string(),
                content_type: input.content_type.clone(),
                size: input.size.unwrap_or(0),
                url,
                expires: expires_at,
            },
            expires_at,
            false,
            None,
        )
    };

    let record = BlobRecord {
        blob_id: blob_id.to_string(),
        account_id: input.account_id.clone(),
        size: input.size.unwrap_or(0),
        content_type: input.content_type.clone(),
        s3_key: object_key,
        created_at: now,
        confirmed_at: None,
        deleted_at: None,
        status: BlobStatus::Pending,
        size_unknown: input.size_unknown,
        iam_auth: input.is_iam_auth,
        multipart,
        upload_id,
        url_expires_at: Some(url_expires_at),
    };

    let account_key = Key::new(format!("ACCOUNT#{}", input.account_id), AccountMeta::META_SK);
    let blob_key = Key::new(format!("ACCOUNT#{}", input.account_id), BlobRecord::blob_sk(&blob_id.to_string()));

    let mut meta_updates = vec![AttrUpdate::Set("updatedAt".into(), serde_json::json!(now))];
    if !input.is_iam_auth {
        meta_updates.push(AttrUpdate::Increment("pendingAllocationsCount".into(), 1.0));
    }
    if let Some(size) = input.size {
        #[allow(clippy::cast_precision_loss)]
        meta_updates.push(AttrUpdate::Increment("quotaRemaining".into(), -(size as f64)));
    }

    let pending_limit_condition = if input.is_iam_auth {
        Condition::Exists
    } else {
        Condition::And(vec![
            Condition::Exists,
            Condition::AttrLessThan("pendingAllocationsCount".into(), config.max_pending_allocations as f64),
        ])
    };
    let quota_condition = match input.size {
        Some(size) => Condition::AttrGreaterOrEqual("quotaRemaining".into(), size as f64),
        None => Condition::Exists,
    };
    let meta_condition = Condition::And(vec![pending_limit_condition, quota_condition]);

    let ops = vec![
        TransactItem::Put { key: blob_key, item: record.to_item(), condition: Some(Condition::NotExists) },
        TransactItem::Update { key: account_key.clone(), updates: meta_updates, condition: Some(meta_condition) },
    ];

    match store.transact_write(ops, cancel).await {
        Ok(()) => Ok(result),
        Err(StoreError::ConditionFailed(_)) => {
            let meta = store
                .get(&account_key, cancel)
                .await
                .ok()
                .flatten()
                .and_then(|item| AccountMeta::from_item(&input.account_id, &item));
            Err(diagnose_condition_failure(meta.as_ref(), &input, config))
        }
        Err(_) => Err(MethodError::server_fail("allocation store write failed")),
    }
}

fn object_store_error(err: ObjectStoreError) -> MethodError {
    MethodError::server_fail(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryMetadataStore;
    use crate::store::object_memory::InMemoryObjectStore;

    async fn provision_account(store: &InMemoryMetadataStore, account: &str, quota: u64) {
        let meta = AccountMeta {
            account_id: account.to_string(),
            quota_bytes: quota,
            quota_remaining: quota as i64,
            pending_allocations_count: 0,
            created_at: now_millis(),
            updated_at: now_millis(),
        };
        store
            .put_conditional(
                &Key::new(format!("ACCOUNT#{account}"), AccountMeta::META_SK),
                meta.to_item(),
                Some(Condition::NotExists),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn single_put_allocation_reserves_quota_and_pending_slot() {
        let store = InMemoryMetadataStore::new();
        let objects = InMemoryObjectStore::new();
        let cancel = CancellationToken::new();
        provision_account(&store, "a1", 1000).await;

        let input = AllocateInput {
            account_id: "a1".into(),
            content_type: "application/pdf".into(),
            size: Some(400),
            size_unknown: false,
            multipart: false,
            is_iam_auth: false,
        };
        let result = allocate(&store, &objects, input, &AllocateConfig::default(), &cancel).await.unwrap();
        assert!(matches!(result, AllocateResult::Single { size: 400, .. }));

        let meta_item = store.get(&Key::new("ACCOUNT#a1", AccountMeta::META_SK), &cancel).await.unwrap().unwrap();
        let meta = AccountMeta::from_item("a1", &meta_item).unwrap();
        assert_eq!(meta.quota_remaining, 600);
        assert_eq!(meta.pending_allocations_count, 1);
    }

    #[tokio::test]
    async fn over_quota_is_diagnosed_and_meta_unchanged() {
        let store = InMemoryMetadataStore::new();
        let objects = InMemoryObjectStore::new();
        let cancel = CancellationToken::new();
        provision_account(&store, "a1", 300).await;

        let input = AllocateInput {
            account_id: "a1".into(),
            content_type: "application/pdf".into(),
            size: Some(400),
            size_unknown: false,
            multipart: false,
            is_iam_auth: false,
        };
        let err = allocate(&store, &objects, input, &AllocateConfig::default(), &cancel).await.unwrap_err();
        assert!(matches!(err, MethodError::OverQuota));

        let meta_item = store.get(&Key::new("ACCOUNT#a1", AccountMeta::META_SK), &cancel).await.unwrap().unwrap();
        let meta = AccountMeta::from_item("a1", &meta_item).unwrap();
        assert_eq!(meta.quota_remaining, 300);
    }

    #[tokio::test]
    async fn unprovisioned_account_is_diagnosed() {
        let store = InMemoryMetadataStore::new();
        let objects = InMemoryObjectStore::new();
        let cancel = CancellationToken::new();

        let input = AllocateInput {
            account_id: "ghost".into(),
            content_type: "application/pdf".into(),
            size: Some(10),
            size_unknown: false,
            multipart: false,
            is_iam_auth: false,
        };
        let err = allocate(&store, &objects, input, &AllocateConfig::default(), &cancel).await.unwrap_err();
        assert!(matches!(err, MethodError::AccountNotProvisioned));
    }

    #[tokio::test]
    async fn multipart_without_size_unknown_is_invalid_arguments() {
        let store = InMemoryMetadataStore::new();
        let objects = InMemoryObjectStore::new();
        let cancel = CancellationToken::new();
        provision_account(&store, "a1", 1000).await;

        let input = AllocateInput {
            account_id: "a1".into(),
            content_type: "application/pdf".into(),
            size: Some(400),
            size_unknown: false,
            multipart: true,
            is_iam_auth: false,
        };
        let err = allocate(&store, &objects, input, &AllocateConfig::default(), &cancel).await.unwrap_err();
        assert!(matches!(err, MethodError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn multipart_allocation_issues_part_urls() {
        let store = InMemoryMetadataStore::new();
        let objects = InMemoryObjectStore::new();
        let cancel = CancellationToken::new();
        provision_account(&store, "a1", 1000).await;

        let mut config = AllocateConfig::default();
        config.multipart_part_count = 3;
        let input = AllocateInput {
            account_id: "a1".into(),
            content_type: "application/octet-stream".into(),
            size: None,
            size_unknown: true,
            multipart: true,
            is_iam_auth: false,
        };
        let result = allocate(&store, &objects, input, &config, &cancel).await.unwrap();
        let AllocateResult::Multipart { parts, .. } = result else { panic!("expected multipart result") };
        assert_eq!(parts.len(), 3);
    }
}
