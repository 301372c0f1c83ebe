//! Download authorization and URL signing (spec.md §4.9): an HTTP-layer
//! endpoint, not a JMAP method, so its errors are [`HttpError`] status
//! codes rather than [`jmap_core::MethodError`] wire errors.

use tokio_util::sync::CancellationToken;

use jmap_core::{AuthContext, HttpError};

use crate::registry::Registry;
use crate::store::{Key, MetadataStore};

use super::signer::UrlSigner;
use super::types::{parse_blob_id, BlobRecord};

/// A successful download resolution: everything the HTTP layer needs to
/// build the `302` response.
#[derive(Debug, Clone)]
pub struct DownloadRedirect {
    pub location: String,
}

const DEFAULT_SIGNED_URL_EXPIRY_MS: i64 = 5 * 60 * 1000;

/// Resolves a download request to a signed CDN redirect (spec.md §4.9).
///
/// # Errors
///
/// `Unauthorized` with no identity at all; `Forbidden` if the identity
/// doesn't match the path account; `BadRequest` for a malformed composite
/// blob id; `NotFound` if the blob doesn't exist, was deleted, or belongs
/// to a different account (deliberately indistinguishable from "doesn't
/// exist", to avoid leaking cross-account existence).
pub async fn download(
    store: &dyn MetadataStore,
    signer: &dyn UrlSigner,
    registry: &Registry,
    path_account_id: &str,
    path_blob_id: &str,
    auth: &AuthContext,
    now: i64,
    cancel: &CancellationToken,
) -> Result<DownloadRedirect, HttpError> {
    let effective_account = match auth {
        AuthContext::Iam { principal } => {
            if !registry.is_known_client_principal(principal) {
                return Err(HttpError::Forbidden);
            }
            path_account_id
        }
        AuthContext::Session { subject } => {
            if subject != path_account_id {
                return Err(HttpError::Forbidden);
            }
            path_account_id
        }
        AuthContext::Unauthenticated => return Err(HttpError::Unauthorized),
    };

    let parsed = parse_blob_id(path_blob_id).map_err(|_| HttpError::BadRequest)?;

    let key = Key::new(format!("ACCOUNT#{effective_account}"), BlobRecord::blob_sk(&parsed.base));
    let item = store.get(&key, cancel).await.map_err(|_| HttpError::Internal)?;
    let record = item.as_ref().and_then(BlobRecord::from_item);
    let Some(record) = record else { return Err(HttpError::NotFound) };
    if record.deleted_at.is_some() || record.account_id != effective_account {
        return Err(HttpError::NotFound);
    }

    let expires_at = now + DEFAULT_SIGNED_URL_EXPIRY_MS;
    let location = signer.sign(&format!("{}/{path_blob_id}", record.account_id), expires_at);
    Ok(DownloadRedirect { location })
}
