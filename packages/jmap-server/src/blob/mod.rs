//! Blob lifecycle (spec.md §4): allocation, confirmation, deletion,
//! cleanup, pending-expiry reaping, and authenticated download.

pub mod allocate;
pub mod cleanup;
pub mod complete;
pub mod confirm;
pub mod delete;
pub mod download;
pub mod reaper;
pub mod signer;
pub mod types;
pub mod upload;

pub use allocate::{allocate, AllocateConfig, AllocateInput, AllocateResult};
pub use cleanup::{cleanup_one, run_cleanup_loop, ChangeStreamConsumer, DeadLetterSink, DeletionEvent};
pub use complete::{complete, CompleteInput};
pub use confirm::{confirm, ConfirmOutcome, ObjectCreatedEvent};
pub use delete::delete;
pub use download::{download, DownloadRedirect};
pub use reaper::{reap_expired_pending, ReapSummary};
pub use signer::{HmacUrlSigner, UrlSigner};
pub use types::{parse_blob_id, AccountMeta, BlobRecord, BlobStatus, ParsedBlobId};
pub use upload::{upload, UploadInput, UploadResult};
