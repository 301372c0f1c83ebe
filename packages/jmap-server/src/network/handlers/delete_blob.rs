//! `DELETE /delete-iam/{accountId}/{blobId}` (spec.md §4.8, §6): IAM-only,
//! no session-authenticated counterpart (deletion on behalf of an account
//! is an administrative action, not a regular client operation).

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use jmap_core::{AuthContext, HttpError};

use crate::blob;

use super::auth::auth_context_from_headers;
use super::{http_error_response, AppState};

pub async fn delete_handler_iam(
    State(state): State<AppState>,
    Path((account_id, blob_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let auth = auth_context_from_headers(&headers);
    let principal = match &auth {
        AuthContext::Iam { principal } => principal,
        _ => return http_error_response(HttpError::Unauthorized),
    };
    if !state.registry.snapshot().is_known_client_principal(principal) {
        return http_error_response(HttpError::Forbidden);
    }

    let cancel = tokio_util::sync::CancellationToken::new();
    match blob::delete(&*state.store, &account_id, &blob_id, &cancel).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(jmap_core::MethodError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, axum::Json(err.to_json())).into_response(),
    }
}
