//! `Blob/allocate` and `Blob/complete` as [`MethodHandler`]s: JSON-level
//! adapters over [`crate::blob::allocate`]/[`crate::blob::complete`]
//! (spec.md §6, RFC 9404). These are the only two methods the plugin
//! registry's default install ships; all other methods are
//! `unknownMethod`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use jmap_core::MethodError;

use crate::blob::{self, AllocateConfig, AllocateInput, AllocateResult, CompleteInput};
use crate::store::object::ObjectStore;
use crate::store::MetadataStore;

use super::operation::OperationContext;
use super::router::MethodHandler;

/// `Blob/allocate`: one `create.{creationId}` entry per requested blob,
/// each independently allocated so one failure doesn't abort the rest.
pub struct BlobAllocateHandler {
    pub store: Arc<dyn MetadataStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub config: AllocateConfig,
}

fn parse_create_entry(account_id: &str, is_iam_auth: bool, entry: &Value) -> Result<AllocateInput, MethodError> {
    let content_type = entry
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| MethodError::invalid_arguments_because("create entry missing type"))?
        .to_string();
    let size_unknown = entry.get("sizeUnknown").and_then(Value::as_bool).unwrap_or(false);
    let size = entry.get("size").and_then(Value::as_u64);
    let multipart = entry.get("multipart").and_then(Value::as_bool).unwrap_or(false);
    Ok(AllocateInput { account_id: account_id.to_string(), content_type, size, size_unknown, multipart, is_iam_auth })
}

fn allocate_result_to_json(result: &AllocateResult) -> Value {
    match result {
        AllocateResult::Single { blob_id, content_type, size, url, expires } => {
            serde_json::json!({"id": blob_id, "type": content_type, "size": size, "url": url, "expires": expires})
        }
        AllocateResult::Multipart { blob_id, content_type, parts, expires } => {
            let parts: Vec<Value> = parts.iter().map(|p| serde_json::json!({"partNumber": p.part_number, "url": p.url})).collect();
            serde_json::json!({"id": blob_id, "type": content_type, "parts": parts, "expires": expires})
        }
    }
}

#[async_trait]
impl MethodHandler for BlobAllocateHandler {
    async fn call(&self, args: Value, ctx: &OperationContext) -> Result<Value, MethodError> {
        let account_id = args
            .get("accountId")
            .and_then(Value::as_str)
            .ok_or_else(|| MethodError::invalid_arguments_because("accountId is required"))?
            .to_string();
        let create = args
            .get("create")
            .and_then(Value::as_object)
            .ok_or_else(|| MethodError::invalid_arguments_because("create is required"))?;

        let is_iam_auth = ctx.auth.iam_principal().is_some();
        let mut created = BTreeMap::new();
        let mut not_created = BTreeMap::new();

        for (creation_id, entry) in create {
            let outcome = match parse_create_entry(&account_id, is_iam_auth, entry) {
                Ok(input) => blob::allocate(&*self.store, &*self.objects, input, &self.config, &ctx.cancel).await.map(|r| allocate_result_to_json(&r)),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(value) => {
                    created.insert(creation_id.clone(), value);
                }
                Err(err) => {
                    not_created.insert(creation_id.clone(), err.to_json());
                }
            }
        }

        Ok(serde_json::json!({"accountId": account_id, "created": created, "notCreated": not_created}))
    }
}

/// `Blob/complete`: finalizes one multipart upload.
pub struct BlobCompleteHandler {
    pub store: Arc<dyn MetadataStore>,
    pub objects: Arc<dyn ObjectStore>,
}

#[async_trait]
impl MethodHandler for BlobCompleteHandler {
    async fn call(&self, args: Value, ctx: &OperationContext) -> Result<Value, MethodError> {
        let account_id = args
            .get("accountId")
            .and_then(Value::as_str)
            .ok_or_else(|| MethodError::invalid_arguments_because("accountId is required"))?
            .to_string();
        let blob_id = args
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| MethodError::invalid_arguments_because("id is required"))?
            .to_string();
        let parts = args
            .get("parts")
            .and_then(Value::as_array)
            .ok_or_else(|| MethodError::invalid_arguments_because("parts is required"))?
            .iter()
            .map(|p| {
                let part_number = p.get("partNumber").and_then(Value::as_u64).ok_or_else(|| MethodError::invalid_arguments_because("part missing partNumber"))? as u32;
                let etag = p.get("etag").and_then(Value::as_str).ok_or_else(|| MethodError::invalid_arguments_because("part missing etag"))?.to_string();
                Ok((part_number, etag))
            })
            .collect::<Result<Vec<_>, MethodError>>()?;

        let input = CompleteInput { account_id: account_id.clone(), blob_id: blob_id.clone(), parts };
        blob::complete(&*self.store, &*self.objects, input, &ctx.cancel).await?;
        Ok(serde_json::json!({"accountId": account_id, "id": blob_id}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::AccountMeta;
    use crate::store::memory::InMemoryMetadataStore;
    use crate::store::object_memory::InMemoryObjectStore;
    use crate::store::{Condition, Key};
    use jmap_core::AuthContext;
    use tokio_util::sync::CancellationToken;

    fn test_ctx() -> OperationContext {
        OperationContext { auth: AuthContext::Unauthenticated, call_timeout_ms: 5000, cancel: CancellationToken::new() }
    }

    async fn provision(store: &dyn MetadataStore, account: &str, quota: u64) {
        let meta = AccountMeta {
            account_id: account.to_string(),
            quota_bytes: quota,
            quota_remaining: quota as i64,
            pending_allocations_count: 0,
            created_at: 0,
            updated_at: 0,
        };
        store
            .put_conditional(&Key::new(format!("ACCOUNT#{account}"), AccountMeta::META_SK), meta.to_item(), Some(Condition::NotExists), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn allocate_handler_splits_created_and_not_created() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let objects: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        provision(store.as_ref(), "a1", 1000).await;

        let handler = BlobAllocateHandler { store: Arc::clone(&store), objects: Arc::clone(&objects), config: AllocateConfig::default() };
        let args = serde_json::json!({
            "accountId": "a1",
            "create": {
                "c1": {"type": "application/pdf", "size": 400},
                "c2": {"type": "application/pdf", "size": 5000}
            }
        });
        let response = handler.call(args, &test_ctx()).await.unwrap();
        assert!(response["created"].get("c1").is_some());
        assert!(response["notCreated"].get("c2").is_some());
    }
}
