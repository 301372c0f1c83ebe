//! Retry/backoff decorator (spec.md §4.1): wraps a [`MetadataStore`] and
//! retries *transient* conflicts — never condition-check failures, which
//! are a definite answer, not noise to retry through.
//!
//! Grounded on the teacher's `LoadShedLayer`/`TimeoutLayer` decorator
//! pattern (`service/middleware/{load_shed,timeout}.rs`): wrap any
//! `Service`/trait object transparently, without the wrapped type needing
//! to know it's being retried.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::metadata::{Condition, Item, Key, MetadataStore, QuerySpec, StoreError, TransactItem};

const BASE_DELAY: Duration = Duration::from_millis(50);
const MAX_RETRIES: u32 = 3;

/// Wraps an inner [`MetadataStore`], retrying [`StoreError::Transient`]
/// failures up to [`MAX_RETRIES`] times with a doubling backoff starting
/// at [`BASE_DELAY`] (50ms, 100ms, 200ms). No jitter: the retry schedule
/// is deterministic so tests can assert on call counts.
pub struct RetryingStore<S> {
    inner: S,
}

impl<S> RetryingStore<S> {
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

async fn with_retry<T, F, Fut>(mut attempt: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, StoreError>>,
{
    let mut delay = BASE_DELAY;
    for retry in 0..=MAX_RETRIES {
        match attempt().await {
            Err(StoreError::Transient(reason)) if retry < MAX_RETRIES => {
                tracing::debug!(retry, %reason, delay_ms = delay.as_millis(), "retrying transient store conflict");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            other => return other,
        }
    }
    unreachable!("loop always returns by the final iteration")
}

#[async_trait::async_trait]
impl<S: MetadataStore> MetadataStore for RetryingStore<S> {
    async fn get(&self, key: &Key, cancel: &CancellationToken) -> Result<Option<Item>, StoreError> {
        with_retry(|| self.inner.get(key, cancel)).await
    }

    async fn put_conditional(
        &self,
        key: &Key,
        item: Item,
        condition: Option<Condition>,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        with_retry(|| self.inner.put_conditional(key, item.clone(), condition.clone(), cancel)).await
    }

    async fn transact_write(
        &self,
        ops: Vec<TransactItem>,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        with_retry(|| self.inner.transact_write(ops.clone(), cancel)).await
    }

    async fn query(&self, spec: QuerySpec, cancel: &CancellationToken) -> Result<Vec<Item>, StoreError> {
        with_retry(|| self.inner.query(spec.clone(), cancel)).await
    }
}
