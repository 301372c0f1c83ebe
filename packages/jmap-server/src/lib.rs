//! JMAP blob storage service: a JMAP (RFC 8620) account's `Blob/allocate`
//! and `Blob/complete` methods (RFC 9404), plus the legacy direct-upload,
//! download, and delete HTTP endpoints that sit alongside them.

pub mod blob;
pub mod dispatch;
pub mod network;
pub mod registry;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {}
}

/// End-to-end tests exercising the full dispatch pipeline against the
/// in-memory stores, transcribing the scenarios named in this service's
/// behavioral contract.
#[cfg(test)]
mod integration_tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use jmap_core::AuthContext;

    use crate::blob::{AccountMeta, AllocateConfig, HmacUrlSigner};
    use crate::dispatch::middleware::build_dispatch_pipeline;
    use crate::dispatch::{
        self, BlobAllocateHandler, BlobCompleteHandler, DispatcherConfig, MethodRouter, OperationContext,
    };
    use crate::registry::{PluginRecord, Registry, RegistryHandle};
    use crate::store::memory::InMemoryMetadataStore;
    use crate::store::object::ObjectStore;
    use crate::store::object_memory::InMemoryObjectStore;
    use crate::store::{Condition, Key, MetadataStore};

    const BLOB_CAPABILITY: &str = "urn:ietf:params:jmap:blob";

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

    fn router(store: Arc<dyn MetadataStore>, objects: Arc<dyn ObjectStore>) -> (MethodRouter, Arc<RegistryHandle>) {
        let registry = Arc::new(RegistryHandle::new(Registry::from_records(vec![
            PluginRecord { method_name: "Blob/allocate".into(), capability: BLOB_CAPABILITY.into(), allowed_principals: None },
            PluginRecord { method_name: "Blob/complete".into(), capability: BLOB_CAPABILITY.into(), allowed_principals: None },
        ])));
        let mut r = MethodRouter::new(Arc::clone(&registry));
        r.register(
            "Blob/allocate",
            Arc::new(BlobAllocateHandler { store: Arc::clone(&store), objects: objects.clone(), config: AllocateConfig::default() }),
        );
        r.register("Blob/complete", Arc::new(BlobCompleteHandler { store, objects }));
        (r, registry)
    }

    fn ctx() -> OperationContext {
        OperationContext { auth: AuthContext::Unauthenticated, call_timeout_ms: 5000, cancel: CancellationToken::new() }
    }

    /// S1: single-PUT allocation through the full dispatcher pipeline
    /// produces a `created` entry and deducts quota/pending-slot usage.
    #[tokio::test]
    async fn full_pipeline_allocate_single_put() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let objects: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        provision(store.as_ref(), "a1", 1000).await;

        let (r, _registry) = router(Arc::clone(&store), objects);
        let calls = dispatch::parse_method_calls(&serde_json::json!([[
            "Blob/allocate",
            {"accountId": "a1", "create": {"c1": {"type": "application/pdf", "size": 400}}},
            "call1"
        ]]));

        let config = Arc::new(DispatcherConfig::default());
        let config2 = Arc::clone(&config);
        let responses = dispatch::execute_batch(calls, |_| ctx(), move || build_dispatch_pipeline(r.clone(), &config2), config.worker_pool_size).await;

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].name, "Blob/allocate");
        assert!(responses[0].args["created"]["c1"].get("id").is_some());
    }

    /// S6: a malformed composite blob id passed into `Blob/complete` is
    /// reported as `notFound` since `id` in `Blob/complete` names the blob
    /// directly rather than through the composite-id grammar, and no such
    /// blob was ever allocated.
    #[tokio::test]
    async fn full_pipeline_complete_unknown_blob_is_not_found() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let objects: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        provision(store.as_ref(), "a1", 1000).await;

        let (r, _registry) = router(Arc::clone(&store), objects);
        let calls = dispatch::parse_method_calls(&serde_json::json!([[
            "Blob/complete",
            {"accountId": "a1", "id": "ghost", "parts": [{"partNumber": 1, "etag": "e1"}]},
            "call1"
        ]]));

        let config = Arc::new(DispatcherConfig::default());
        let config2 = Arc::clone(&config);
        let responses = dispatch::execute_batch(calls, |_| ctx(), move || build_dispatch_pipeline(r.clone(), &config2), config.worker_pool_size).await;

        assert_eq!(responses[0].name, "error");
        assert_eq!(responses[0].args["type"], "notFound");
    }

    #[tokio::test]
    async fn unknown_method_is_unknown_method_error() {
        let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let objects: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let (r, _registry) = router(store, objects);
        let calls = dispatch::parse_method_calls(&serde_json::json!([["Blob/nonexistent", {}, "call1"]]));

        let config = Arc::new(DispatcherConfig::default());
        let config2 = Arc::clone(&config);
        let responses = dispatch::execute_batch(calls, |_| ctx(), move || build_dispatch_pipeline(r.clone(), &config2), config.worker_pool_size).await;

        assert_eq!(responses[0].name, "error");
        assert_eq!(responses[0].args["type"], "unknownMethod");
    }
}
