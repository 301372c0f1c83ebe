//! Blob/account record shapes and the small parsers the lifecycle
//! modules share: a `token/token[;params]` content-type check (spec.md
//! §4.5) and the composite `{base},{start},{end}` blob-id grammar
//! (spec.md §4.9, §8 S6).
//!
//! No direct teacher analogue (the teacher has no blob subsystem);
//! grounded on the trait-for-external-collaborator pattern used
//! throughout the teacher's storage traits, applied here to the record
//! shapes spec.md §3 names explicitly.

use std::time::{SystemTime, UNIX_EPOCH};

use jmap_core::{AccountId, BlobId, MethodError};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::store::Item;

/// Milliseconds since the Unix epoch, used for every stored timestamp.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// Lifecycle status of a blob record (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobStatus {
    Pending,
    Confirmed,
}

impl BlobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            _ => None,
        }
    }
}

/// A blob record (spec.md §3), read out of a raw [`Item`].
#[derive(Debug, Clone)]
pub struct BlobRecord {
    pub blob_id: String,
    pub account_id: String,
    pub size: u64,
    pub content_type: String,
    pub s3_key: String,
    pub created_at: i64,
    pub confirmed_at: Option<i64>,
    pub deleted_at: Option<i64>,
    pub status: BlobStatus,
    pub size_unknown: bool,
    pub iam_auth: bool,
    pub multipart: bool,
    pub upload_id: Option<String>,
    pub url_expires_at: Option<i64>,
}

impl BlobRecord {
    #[must_use]
    pub fn blob_sk(blob_id: &str) -> String {
        format!("BLOB#{blob_id}")
    }

    #[must_use]
    pub fn from_item(item: &Item) -> Option<Self> {
        Some(Self {
            blob_id: item.get("blobId")?.as_str()?.to_string(),
            account_id: item.get("accountId")?.as_str()?.to_string(),
            size: item.get("size")?.as_u64()?,
            content_type: item.get("contentType")?.as_str()?.to_string(),
            s3_key: item.get("s3Key")?.as_str()?.to_string(),
            created_at: item.get("createdAt")?.as_i64()?,
            confirmed_at: item.get("confirmedAt").and_then(Value::as_i64),
            deleted_at: item.get("deletedAt").and_then(Value::as_i64),
            status: item.get("status")?.as_str().and_then(BlobStatus::parse)?,
            size_unknown: item.get("sizeUnknown").and_then(Value::as_bool).unwrap_or(false),
            iam_auth: item.get("iamAuth").and_then(Value::as_bool).unwrap_or(false),
            multipart: item.get("multipart").and_then(Value::as_bool).unwrap_or(false),
            upload_id: item.get("uploadId").and_then(|v| v.as_str().map(ToString::to_string)),
            url_expires_at: item.get("urlExpiresAt").and_then(Value::as_i64),
        })
    }

    #[must_use]
    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert("blobId".into(), Value::from(self.blob_id.clone()));
        item.insert("accountId".into(), Value::from(self.account_id.clone()));
        item.insert("size".into(), Value::from(self.size));
        item.insert("contentType".into(), Value::from(self.content_type.clone()));
        item.insert("s3Key".into(), Value::from(self.s3_key.clone()));
        item.insert("createdAt".into(), Value::from(self.created_at));
        item.insert("status".into(), Value::from(self.status.as_str()));
        if let Some(v) = self.confirmed_at {
            item.insert("confirmedAt".into(), Value::from(v));
        }
        if let Some(v) = self.deleted_at {
            item.insert("deletedAt".into(), Value::from(v));
        }
        if self.size_unknown {
            item.insert("sizeUnknown".into(), Value::from(true));
        }
        if self.iam_auth {
            item.insert("iamAuth".into(), Value::from(true));
        }
        if self.multipart {
            item.insert("multipart".into(), Value::from(true));
        }
        if let Some(v) = &self.upload_id {
            item.insert("uploadId".into(), Value::from(v.clone()));
        }
        if let Some(v) = self.url_expires_at {
            item.insert("urlExpiresAt".into(), Value::from(v));
        }
        if self.status == BlobStatus::Pending {
            if let Some(expires) = self.url_expires_at {
                item.insert("gsi1pk".into(), Value::from("PENDING"));
                item.insert(
                    "gsi1sk".into(),
                    Value::from(format!("EXPIRES#{expires:020}#{}#{}", self.account_id, self.blob_id)),
                );
            }
        }
        item
    }
}

/// Reads a numeric attribute as `i64`, accepting the float-backed
/// [`Value::Number`] that [`crate::store::AttrUpdate::Increment`] leaves
/// behind alongside integer literals written by a plain `Set`.
fn as_i64_lenient(value: &Value) -> Option<i64> {
    #[allow(clippy::cast_possible_truncation)]
    value.as_i64().or_else(|| value.as_f64().map(|f| f.round() as i64))
}

/// Account META record (spec.md §3).
#[derive(Debug, Clone)]
pub struct AccountMeta {
    pub account_id: String,
    pub quota_bytes: u64,
    pub quota_remaining: i64,
    pub pending_allocations_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl AccountMeta {
    pub const META_SK: &'static str = "META#";

    #[must_use]
    pub fn from_item(account_id: &str, item: &Item) -> Option<Self> {
        Some(Self {
            account_id: account_id.to_string(),
            quota_bytes: item.get("quotaBytes").and_then(as_i64_lenient)? as u64,
            quota_remaining: item.get("quotaRemaining").and_then(as_i64_lenient)?,
            pending_allocations_count: item.get("pendingAllocationsCount").and_then(as_i64_lenient)?,
            created_at: item.get("createdAt").and_then(as_i64_lenient)?,
            updated_at: item.get("updatedAt").and_then(as_i64_lenient)?,
        })
    }

    #[must_use]
    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert("quotaBytes".into(), Value::from(self.quota_bytes));
        item.insert("quotaRemaining".into(), Value::from(self.quota_remaining));
        item.insert("pendingAllocationsCount".into(), Value::from(self.pending_allocations_count));
        item.insert("createdAt".into(), Value::from(self.created_at));
        item.insert("updatedAt".into(), Value::from(self.updated_at));
        item
    }
}

fn content_type_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9!#$&^_.+-]+/[A-Za-z0-9!#$&^_.+-]+(;.*)?$").expect("valid regex"))
}

/// Validates a content type as `token/token` with optional `; params`
/// (spec.md §4.5 validation step 3).
///
/// # Errors
///
/// Returns `invalidProperties{["type"]}` if it doesn't parse.
pub fn validate_content_type(content_type: &str) -> Result<(), MethodError> {
    if content_type_regex().is_match(content_type) {
        Ok(())
    } else {
        Err(MethodError::InvalidProperties { properties: vec!["type".into()], description: None })
    }
}

/// A parsed blob-id path segment: either a bare id, or a composite
/// `{base},{start},{end}` byte-range reference (spec.md §4.9, §8 S6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBlobId {
    pub base: String,
    pub range: Option<(u64, u64)>,
}

/// Parses a `blobId` path segment. A single comma or no comma is always
/// treated as a bare id (even if the suffix after one comma looks
/// numeric); only an exact 3-field comma split is interpreted as a
/// composite id, and an invalid 3-field split is a hard error rather than
/// falling back to "bare" (spec.md §8 S6: `"a,b,c,d"` is `invalidArguments`,
/// not a bare id with an embedded comma).
///
/// # Errors
///
/// Returns `invalidArguments` for a comma count other than 0/1/2, or for
/// a 3-field split whose range bounds don't parse as `start < end`.
pub fn parse_blob_id(raw: &str) -> Result<ParsedBlobId, MethodError> {
    let parts: Vec<&str> = raw.split(',').collect();
    match parts.as_slice() {
        [base] => Ok(ParsedBlobId { base: (*base).to_string(), range: None }),
        [base, second] => Ok(ParsedBlobId { base: format!("{base},{second}"), range: None }),
        [base, start, end] => {
            let start: u64 = start
                .parse()
                .map_err(|_| MethodError::invalid_arguments_because("composite blob id start is not an integer"))?;
            let end: u64 = end
                .parse()
                .map_err(|_| MethodError::invalid_arguments_because("composite blob id end is not an integer"))?;
            if end <= start {
                return Err(MethodError::invalid_arguments_because("composite blob id end must exceed start"));
            }
            Ok(ParsedBlobId { base: (*base).to_string(), range: Some((start, end)) })
        }
        _ => Err(MethodError::invalid_arguments_because("malformed composite blob id")),
    }
}

pub fn blob_id_new() -> BlobId {
    BlobId::generate()
}

pub fn account_id(s: impl Into<String>) -> AccountId {
    AccountId::from(s.into())
}
