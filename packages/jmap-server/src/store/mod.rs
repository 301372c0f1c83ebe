//! Persistence abstractions: the metadata store (spec.md §4.1) and the
//! object store (spec.md §4.2), plus in-memory reference implementations
//! and the retry/backoff decorator shared by callers of either.

pub mod memory;
pub mod metadata;
pub mod object;
pub mod object_memory;
pub mod retry;

pub use metadata::{
    check_conditions, AttrUpdate, Condition, ConditionFailure, IndexName, Item, Key,
    MetadataStore, QuerySpec, StoreError, TransactItem,
};
pub use object::{ObjectStore, PartUploadUrl, PresignedUploadUrl};
