//! Metadata store abstraction (spec.md §4.1).
//!
//! A single key-value table keyed by a composite `(pk, sk)`, with
//! conditional single-item writes, multi-item conditional transactions,
//! and prefix/index queries. Modeled on [`crate::traits`]'s predecessor in
//! the teacher, `ServerStorage` (`async_trait`, `anyhow::Result` at the
//! boundary, `Send + Sync`), generalized to DynamoDB-style conditional
//! writes instead of plain map load/store.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Composite primary key: `PK=ACCOUNT#{id}`, `SK=BLOB#{blobId}`, etc.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    pub pk: String,
    pub sk: String,
}

impl Key {
    #[must_use]
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self { pk: pk.into(), sk: sk.into() }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pk, self.sk)
    }
}

/// A record's attributes. Values are JSON scalars/arrays/objects, matching
/// the attribute model spec.md §3 describes for each entity.
pub type Item = BTreeMap<String, Value>;

/// Secondary index name. Only GSI1 (the pending-allocation expiry index,
/// spec.md §3) exists in this system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexName {
    Gsi1,
}

/// A conditional expression evaluated against the *current* item (or
/// absence of one) before a write is allowed to proceed.
#[derive(Debug, Clone)]
pub enum Condition {
    Exists,
    NotExists,
    AttrEquals(String, Value),
    AttrLessThan(String, f64),
    AttrGreaterOrEqual(String, f64),
    AttrAbsentOr(String, Box<Condition>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    #[must_use]
    pub fn evaluate(&self, item: Option<&Item>) -> bool {
        match self {
            Self::Exists => item.is_some(),
            Self::NotExists => item.is_none(),
            Self::AttrEquals(attr, expected) => {
                item.and_then(|i| i.get(attr)).is_some_and(|v| v == expected)
            }
            Self::AttrLessThan(attr, bound) => item
                .and_then(|i| i.get(attr))
                .and_then(Value::as_f64)
                .is_some_and(|v| v < *bound),
            Self::AttrGreaterOrEqual(attr, bound) => item
                .and_then(|i| i.get(attr))
                .and_then(Value::as_f64)
                .is_some_and(|v| v >= *bound),
            Self::AttrAbsentOr(attr, inner) => {
                let absent = item.is_none_or(|i| !i.contains_key(attr));
                absent || inner.evaluate(item)
            }
            Self::And(conds) => conds.iter().all(|c| c.evaluate(item)),
            Self::Or(conds) => conds.iter().any(|c| c.evaluate(item)),
        }
    }
}

/// A single attribute mutation within an `Update` transact item.
#[derive(Debug, Clone)]
pub enum AttrUpdate {
    Set(String, Value),
    /// Adds a (possibly negative) delta to a numeric attribute, treating a
    /// missing attribute as 0.
    Increment(String, f64),
    Remove(String),
}

/// One item within a [`MetadataStore::transact_write`] call.
#[derive(Debug, Clone)]
pub enum TransactItem {
    Put { key: Key, item: Item, condition: Option<Condition> },
    Update { key: Key, updates: Vec<AttrUpdate>, condition: Option<Condition> },
    Delete { key: Key, condition: Option<Condition> },
}

impl TransactItem {
    #[must_use]
    pub fn key(&self) -> &Key {
        match self {
            Self::Put { key, .. } | Self::Update { key, .. } | Self::Delete { key, .. } => key,
        }
    }

    fn condition(&self) -> Option<&Condition> {
        match self {
            Self::Put { condition, .. } | Self::Delete { condition, .. } => condition.as_ref(),
            Self::Update { condition, .. } => condition.as_ref(),
        }
    }
}

/// A query over a partition (optionally restricted to an `sk` prefix) or a
/// secondary index range.
#[derive(Debug, Clone)]
pub enum QuerySpec {
    /// `query(pk, skPrefix)` — e.g. all `BLOB#` records for an account.
    Partition { pk: String, sk_prefix: Option<String> },
    /// `query(indexRange)` — e.g. `gsi1pk="PENDING", gsi1sk <= "EXPIRES#..."`.
    Index { index: IndexName, pk: String, sk_le: Option<String>, sk_ge: Option<String> },
}

/// One op's condition-check failure, surfaced so callers can diagnose
/// which clause failed (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct ConditionFailure {
    pub key: Key,
    pub reason: String,
}

/// Errors from the metadata store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A conditional write failed. Not retried by [`crate::store::retry`].
    #[error("condition check failed: {0:?}")]
    ConditionFailed(Vec<ConditionFailure>),
    /// An optimistic-concurrency abort that is *not* a condition failure —
    /// retried internally per spec.md §4.1.
    #[error("transient conflict: {0}")]
    Transient(String),
    /// The caller's cancellation/deadline context fired.
    #[error("cancelled")]
    Cancelled,
    /// Anything else (serialization, connectivity, ...).
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Single-table metadata store: `get`/`putConditional`/`transactWrite`/`query`.
///
/// Every call takes a [`CancellationToken`] (spec.md §4.1: "all calls
/// propagate a cancellation/deadline context").
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, key: &Key, cancel: &CancellationToken) -> Result<Option<Item>, StoreError>;

    async fn put_conditional(
        &self,
        key: &Key,
        item: Item,
        condition: Option<Condition>,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>;

    /// All ops succeed or all fail atomically. On condition failure, the
    /// returned error lists every op whose condition did not hold (there
    /// may be more than one in a multi-item transaction).
    async fn transact_write(
        &self,
        ops: Vec<TransactItem>,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>;

    async fn query(&self, spec: QuerySpec, cancel: &CancellationToken) -> Result<Vec<Item>, StoreError>;
}

/// Evaluate a transaction's conditions against the given snapshot reads,
/// returning the list of failures (empty means all conditions passed).
///
/// Shared by every [`MetadataStore`] implementation so the condition
/// semantics (in particular, a missing key reads as "no item") are
/// identical across backends.
#[must_use]
pub fn check_conditions(ops: &[TransactItem], reads: &[Option<Item>]) -> Vec<ConditionFailure> {
    ops.iter()
        .zip(reads)
        .filter_map(|(op, current)| {
            let cond = op.condition()?;
            if cond.evaluate(current.as_ref()) {
                None
            } else {
                Some(ConditionFailure {
                    key: op.key().clone(),
                    reason: format!("{cond:?} failed against {current:?}"),
                })
            }
        })
        .collect()
}
