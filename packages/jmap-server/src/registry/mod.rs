//! Plugin/capability registry (spec.md §4.2, §9): which methods exist,
//! which capability URI each belongs to, and which principals may call
//! them. Built once at startup from the metadata store and held behind an
//! atomically-swappable snapshot so a reload never blocks a request that's
//! reading the previous snapshot mid-dispatch.
//!
//! Grounded directly on the teacher's `ServiceRegistry`
//! (`service/registry.rs`: `DashMap` by-name lookup, built once, looked up
//! by every request) generalized from Rust-type-keyed services to JMAP
//! capability/method/principal records; the "hold behind an immutable
//! snapshot pointer, swap atomically" design is grounded on
//! `network/shutdown.rs`'s `ArcSwap<HealthState>` use.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;

use jmap_core::canonicalize_principal;

use crate::store::{MetadataStore, QuerySpec, StoreError};

const PLUGIN_PK: &str = "PLUGIN#";
const PLUGIN_SK_PREFIX: &str = "PLUGIN#";

/// One registered JMAP method: which capability it belongs to, and the
/// (optional) allow-list of IAM principals permitted to call it. `None`
/// means any authenticated caller may call it.
#[derive(Debug, Clone)]
pub struct PluginRecord {
    pub method_name: String,
    pub capability: String,
    pub allowed_principals: Option<Vec<String>>,
}

/// An immutable, fully-loaded registry snapshot.
#[derive(Debug, Default)]
pub struct Registry {
    capabilities: HashSet<String>,
    methods: HashMap<String, PluginRecord>,
    /// Canonicalized IAM principals allowed to reach the IAM-authenticated
    /// download/delete/upload endpoints on behalf of any account (spec.md
    /// §4.9's `clientPrincipals`) — distinct from a method's own
    /// `allowed_principals`, since those endpoints aren't JMAP methods.
    client_principals: HashSet<String>,
    /// Each plugin record's `version` attribute, keyed by plugin id.
    /// Informational only — nothing in this crate gates behavior on it.
    versions: HashMap<String, String>,
}

impl Registry {
    #[must_use]
    pub fn from_records(records: Vec<PluginRecord>) -> Self {
        let mut capabilities = HashSet::new();
        let mut methods = HashMap::new();
        for record in records {
            capabilities.insert(record.capability.clone());
            methods.insert(record.method_name.clone(), record);
        }
        Self { capabilities, methods, client_principals: HashSet::new(), versions: HashMap::new() }
    }

    #[must_use]
    pub fn with_client_principals(mut self, principals: impl IntoIterator<Item = String>) -> Self {
        self.client_principals = principals.into_iter().map(|p| canonicalize_principal(&p)).collect();
        self
    }

    #[must_use]
    pub fn with_versions(mut self, versions: HashMap<String, String>) -> Self {
        self.versions = versions;
        self
    }

    #[must_use]
    pub fn plugin_version(&self, plugin_id: &str) -> Option<&str> {
        self.versions.get(plugin_id).map(String::as_str)
    }

    #[must_use]
    pub fn is_known_client_principal(&self, principal: &str) -> bool {
        self.client_principals.contains(&canonicalize_principal(principal))
    }

    /// The capability URIs this server supports, exposed read-only for an
    /// external session-document generator (spec.md §4.3) — this crate
    /// has no `/session` endpoint of its own.
    #[must_use]
    pub fn capabilities(&self) -> &HashSet<String> {
        &self.capabilities
    }

    #[must_use]
    pub fn has_capability(&self, uri: &str) -> bool {
        self.capabilities.contains(uri)
    }

    #[must_use]
    pub fn method_target(&self, method_name: &str) -> Option<&PluginRecord> {
        self.methods.get(method_name)
    }

    /// Whether `principal` may call `record`'s method, canonicalizing both
    /// sides so a temporary assumed-role credential matches its base role
    /// ACL entry (spec.md §4.2, §9).
    #[must_use]
    pub fn is_allowed_principal(&self, record: &PluginRecord, principal: &str) -> bool {
        match &record.allowed_principals {
            None => true,
            Some(allowed) => {
                let canonical_caller = canonicalize_principal(principal);
                allowed.iter().any(|p| canonicalize_principal(p) == canonical_caller)
            }
        }
    }
}

/// One parsed `PLUGIN#{pluginId}` record: every method it registers, the
/// capability URIs it declares (which may include capabilities with no
/// methods of their own), the client principals it authorizes, and its
/// version tag.
struct ParsedPlugin {
    capabilities: Vec<String>,
    records: Vec<PluginRecord>,
    client_principals: Vec<String>,
    plugin_id: Option<String>,
    version: Option<String>,
}

/// Parses one item stored under PK=`PLUGIN#`, SK=`PLUGIN#{pluginId}`.
///
/// `methods` maps method-name to `{invokeTarget, allowedPrincipals}`,
/// where `invokeTarget` is the capability URI the method belongs to;
/// `capabilities` and `clientPrincipals` are read directly off the item.
fn parse_plugin_item(item: &crate::store::Item) -> ParsedPlugin {
    let capabilities = item
        .get("capabilities")
        .and_then(|v| v.as_object())
        .map(|obj| obj.keys().cloned().collect())
        .unwrap_or_default();

    let records = item
        .get("methods")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(method_name, target)| {
                    let capability = target.get("invokeTarget")?.as_str()?.to_string();
                    let allowed_principals = target.get("allowedPrincipals").and_then(|v| v.as_array()).map(|arr| {
                        arr.iter().filter_map(|v| v.as_str().map(ToString::to_string)).collect()
                    });
                    Some(PluginRecord { method_name: method_name.clone(), capability, allowed_principals })
                })
                .collect()
        })
        .unwrap_or_default();

    let client_principals = item
        .get("clientPrincipals")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(ToString::to_string)).collect())
        .unwrap_or_default();

    let plugin_id = item.get("pluginId").and_then(|v| v.as_str()).map(ToString::to_string);
    let version = item.get("version").and_then(|v| v.as_str()).map(ToString::to_string);

    ParsedPlugin { capabilities, records, client_principals, plugin_id, version }
}

/// Loads a [`Registry`] snapshot from the metadata store.
///
/// # Errors
///
/// Returns an error if the underlying query fails.
pub async fn load_from_store(
    store: &dyn MetadataStore,
    cancel: &CancellationToken,
) -> Result<Registry, StoreError> {
    let plugin_items =
        store.query(QuerySpec::Partition { pk: PLUGIN_PK.to_string(), sk_prefix: Some(PLUGIN_SK_PREFIX.to_string()) }, cancel).await?;

    let mut records = Vec::new();
    let mut client_principals = Vec::new();
    let mut versions = HashMap::new();
    let mut registry = Registry::default();

    for item in &plugin_items {
        let parsed = parse_plugin_item(item);
        for capability in parsed.capabilities {
            registry.capabilities.insert(capability);
        }
        records.extend(parsed.records);
        client_principals.extend(parsed.client_principals);
        if let (Some(plugin_id), Some(version)) = (parsed.plugin_id, parsed.version) {
            versions.insert(plugin_id, version);
        }
    }

    for record in records {
        registry.capabilities.insert(record.capability.clone());
        registry.methods.insert(record.method_name.clone(), record);
    }

    Ok(registry.with_client_principals(client_principals).with_versions(versions))
}

/// Atomically-swappable registry handle shared by the dispatcher.
///
/// A reload replaces the whole snapshot in one `store()` call; readers
/// already holding a reference via [`RegistryHandle::snapshot`] keep
/// using the old snapshot until they next call `snapshot()`.
pub struct RegistryHandle {
    current: ArcSwap<Registry>,
}

impl RegistryHandle {
    #[must_use]
    pub fn new(initial: Registry) -> Self {
        Self { current: ArcSwap::from_pointee(initial) }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<Registry> {
        self.current.load_full()
    }

    /// Reloads the registry from the metadata store and swaps it in.
    ///
    /// # Errors
    ///
    /// Returns an error if the reload query fails; the previous snapshot
    /// remains in effect.
    pub async fn reload(&self, store: &dyn MetadataStore, cancel: &CancellationToken) -> Result<(), StoreError> {
        let fresh = load_from_store(store, cancel).await?;
        self.current.store(Arc::new(fresh));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryMetadataStore;
    use crate::store::{Condition, Key};
    use serde_json::{json, Value};

    /// One `PLUGIN#{pluginId}` item with a single method, mirroring
    /// spec.md's literal plugin record: `capabilities`/`methods`/
    /// `clientPrincipals`/`version` all on the one record.
    fn plugin_item(
        plugin_id: &str,
        method: &str,
        capability: &str,
        allowed: Option<&[&str]>,
        client_principals: &[&str],
        version: &str,
    ) -> crate::store::Item {
        let mut method_target = serde_json::Map::new();
        method_target.insert("invocationType".into(), json!("rpc"));
        method_target.insert("invokeTarget".into(), json!(capability));
        if let Some(allowed) = allowed {
            method_target.insert("allowedPrincipals".into(), json!(allowed));
        }
        let mut methods = serde_json::Map::new();
        methods.insert(method.to_string(), Value::Object(method_target));

        let mut item = crate::store::Item::new();
        item.insert("pluginId".into(), json!(plugin_id));
        item.insert("capabilities".into(), json!({ capability: {} }));
        item.insert("methods".into(), Value::Object(methods));
        item.insert("clientPrincipals".into(), json!(client_principals));
        item.insert("version".into(), json!(version));
        item
    }

    #[tokio::test]
    async fn loads_methods_and_capabilities() {
        let store = InMemoryMetadataStore::new();
        let cancel = CancellationToken::new();
        store
            .put_conditional(
                &Key::new(PLUGIN_PK, format!("{PLUGIN_SK_PREFIX}blob")),
                plugin_item("blob", "Blob/allocate", "urn:example:blob", None, &[], "1"),
                Some(Condition::NotExists),
                &cancel,
            )
            .await
            .unwrap();

        let registry = load_from_store(&store, &cancel).await.unwrap();
        assert!(registry.has_capability("urn:example:blob"));
        assert!(registry.method_target("Blob/allocate").is_some());
        assert!(registry.method_target("Unknown/method").is_none());
        assert_eq!(registry.plugin_version("blob"), Some("1"));
    }

    #[test]
    fn allowed_principal_matches_after_canonicalization() {
        let record = PluginRecord {
            method_name: "Blob/allocate".into(),
            capability: "urn:example:blob".into(),
            allowed_principals: Some(vec!["arn:aws:iam::111122223333:role/MyRole".into()]),
        };
        let registry = Registry::from_records(vec![record.clone()]);
        let assumed = "arn:aws:sts::111122223333:assumed-role/MyRole/session-name";
        assert!(registry.is_allowed_principal(&record, assumed));
        assert!(!registry.is_allowed_principal(&record, "arn:aws:iam::111122223333:role/OtherRole"));
    }

    #[tokio::test]
    async fn client_principal_allow_list_loads_and_canonicalizes() {
        let store = InMemoryMetadataStore::new();
        let cancel = CancellationToken::new();
        store
            .put_conditional(
                &Key::new(PLUGIN_PK, format!("{PLUGIN_SK_PREFIX}blob")),
                plugin_item(
                    "blob",
                    "Blob/allocate",
                    "urn:example:blob",
                    None,
                    &["arn:aws:iam::111122223333:role/Downloader"],
                    "1",
                ),
                Some(Condition::NotExists),
                &cancel,
            )
            .await
            .unwrap();

        let registry = load_from_store(&store, &cancel).await.unwrap();
        let assumed = "arn:aws:sts::111122223333:assumed-role/Downloader/session-name";
        assert!(registry.is_known_client_principal(assumed));
        assert!(!registry.is_known_client_principal("arn:aws:iam::111122223333:role/SomeoneElse"));
    }

    #[tokio::test]
    async fn reload_swaps_snapshot_without_dropping_old_readers() {
        let store = InMemoryMetadataStore::new();
        let cancel = CancellationToken::new();
        let handle = RegistryHandle::new(Registry::default());
        let before = handle.snapshot();
        assert!(before.method_target("Blob/allocate").is_none());

        store
            .put_conditional(
                &Key::new(PLUGIN_PK, format!("{PLUGIN_SK_PREFIX}blob")),
                plugin_item("blob", "Blob/allocate", "urn:example:blob", None, &[], "1"),
                Some(Condition::NotExists),
                &cancel,
            )
            .await
            .unwrap();
        handle.reload(&store, &cancel).await.unwrap();

        assert!(before.method_target("Blob/allocate").is_none());
        assert!(handle.snapshot().method_target("Blob/allocate").is_some());
    }
}
