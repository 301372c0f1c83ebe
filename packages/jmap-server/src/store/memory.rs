//! In-memory [`MetadataStore`], grounded on the teacher's `HashMapStorage`
//! (`storage/engines/hashmap.rs`): a plain concurrent map standing in for
//! a real backend, faithful to the conditional-write/transaction contract
//! rather than a simplified stand-in (SPEC_FULL.md "ambient stack").
//!
//! `transact_write` needs cross-key atomicity that per-key `DashMap`
//! locking alone can't give, so all writes additionally take a single
//! `parking_lot::Mutex` for the duration of the check-then-apply.

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::metadata::{
    check_conditions, AttrUpdate, Condition, Item, Key, MetadataStore, QuerySpec, StoreError,
    TransactItem,
};

fn gsi1_key(item: &Item) -> Option<(String, String)> {
    let pk = item.get("gsi1pk")?.as_str()?.to_string();
    let sk = item.get("gsi1sk")?.as_str()?.to_string();
    Some((pk, sk))
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), StoreError> {
    if cancel.is_cancelled() {
        Err(StoreError::Cancelled)
    } else {
        Ok(())
    }
}

/// Deterministic in-memory metadata store for tests and local development.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    rows: DashMap<Key, Item>,
    write_lock: Mutex<()>,
}

impl InMemoryMetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(&self, op: &TransactItem) {
        match op {
            TransactItem::Put { key, item, .. } => {
                self.rows.insert(key.clone(), item.clone());
            }
            TransactItem::Delete { key, .. } => {
                self.rows.remove(key);
            }
            TransactItem::Update { key, updates, .. } => {
                let mut entry = self.rows.entry(key.clone()).or_default();
                for update in updates {
                    match update {
                        AttrUpdate::Set(attr, value) => {
                            entry.insert(attr.clone(), value.clone());
                        }
                        AttrUpdate::Remove(attr) => {
                            entry.remove(attr);
                        }
                        AttrUpdate::Increment(attr, delta) => {
                            let current = entry.get(attr).and_then(serde_json::Value::as_f64).unwrap_or(0.0);
                            let next = current + delta;
                            entry.insert(attr.clone(), serde_json::json!(next));
                        }
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self, key: &Key, cancel: &CancellationToken) -> Result<Option<Item>, StoreError> {
        check_cancelled(cancel)?;
        Ok(self.rows.get(key).map(|r| r.clone()))
    }

    async fn put_conditional(
        &self,
        key: &Key,
        item: Item,
        condition: Option<Condition>,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        self.transact_write(
            vec![TransactItem::Put { key: key.clone(), item, condition }],
            cancel,
        )
        .await
    }

    async fn transact_write(
        &self,
        ops: Vec<TransactItem>,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        check_cancelled(cancel)?;
        let _guard = self.write_lock.lock();
        let reads: Vec<Option<Item>> =
            ops.iter().map(|op| self.rows.get(op.key()).map(|r| r.clone())).collect();
        let failures = check_conditions(&ops, &reads);
        if !failures.is_empty() {
            return Err(StoreError::ConditionFailed(failures));
        }
        for op in &ops {
            self.apply(op);
        }
        Ok(())
    }

    async fn query(&self, spec: QuerySpec, cancel: &CancellationToken) -> Result<Vec<Item>, StoreError> {
        check_cancelled(cancel)?;
        let results = match spec {
            QuerySpec::Partition { pk, sk_prefix } => self
                .rows
                .iter()
                .filter(|entry| {
                    entry.key().pk == pk
                        && sk_prefix.as_ref().is_none_or(|prefix| entry.key().sk.starts_with(prefix.as_str()))
                })
                .map(|entry| entry.value().clone())
                .collect(),
            QuerySpec::Index { pk, sk_le, sk_ge, .. } => self
                .rows
                .iter()
                .filter_map(|entry| {
                    let (gpk, gsk) = gsi1_key(entry.value())?;
                    if gpk != pk {
                        return None;
                    }
                    if let Some(ge) = &sk_ge {
                        if gsk.as_str() < ge.as_str() {
                            return None;
                        }
                    }
                    if let Some(le) = &sk_le {
                        if gsk.as_str() > le.as_str() {
                            return None;
                        }
                    }
                    Some(entry.value().clone())
                })
                .collect(),
        };
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(pairs: &[(&str, serde_json::Value)]) -> Item {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn put_conditional_not_exists_then_again_fails() {
        let store = InMemoryMetadataStore::new();
        let cancel = CancellationToken::new();
        let key = Key::new("ACCOUNT#a1", "BLOB#b1");

        store
            .put_conditional(&key, item(&[("state", json!("pending"))]), Some(Condition::NotExists), &cancel)
            .await
            .unwrap();

        let err = store
            .put_conditional(&key, item(&[("state", json!("pending"))]), Some(Condition::NotExists), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed(_)));
    }

    #[tokio::test]
    async fn transact_write_is_all_or_nothing() {
        let store = InMemoryMetadataStore::new();
        let cancel = CancellationToken::new();
        let present = Key::new("ACCOUNT#a1", "META#quota");
        let absent = Key::new("ACCOUNT#a1", "BLOB#b1");

        store
            .put_conditional(&present, item(&[("quotaRemaining", json!(100))]), None, &cancel)
            .await
            .unwrap();

        let result = store
            .transact_write(
                vec![
                    TransactItem::Update {
                        key: present.clone(),
                        updates: vec![AttrUpdate::Increment("quotaRemaining".into(), -10.0)],
                        condition: None,
                    },
                    TransactItem::Put { key: absent.clone(), item: item(&[]), condition: Some(Condition::Exists) },
                ],
                &cancel,
            )
            .await;
        assert!(result.is_err());

        // the quota update must not have been applied since the transaction failed atomically
        let still = store.get(&present, &cancel).await.unwrap().unwrap();
        assert_eq!(still.get("quotaRemaining").and_then(serde_json::Value::as_f64), Some(100.0));
    }

    #[tokio::test]
    async fn query_partition_filters_by_sk_prefix() {
        let store = InMemoryMetadataStore::new();
        let cancel = CancellationToken::new();
        store
            .put_conditional(&Key::new("ACCOUNT#a1", "BLOB#b1"), item(&[]), None, &cancel)
            .await
            .unwrap();
        store
            .put_conditional(&Key::new("ACCOUNT#a1", "META#quota"), item(&[]), None, &cancel)
            .await
            .unwrap();

        let rows = store
            .query(QuerySpec::Partition { pk: "ACCOUNT#a1".into(), sk_prefix: Some("BLOB#".into()) }, &cancel)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let store = InMemoryMetadataStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = store.get(&Key::new("a", "b"), &cancel).await.unwrap_err();
        assert!(matches!(err, StoreError::Cancelled));
    }
}
