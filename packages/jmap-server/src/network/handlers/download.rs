//! `GET /download/{accountId}/{blobId}`, `GET /download-iam/{accountId}/{blobId}`
//! (spec.md §4.9, §6): a signed-redirect endpoint, not a JMAP method.

use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::blob;

use super::auth::auth_context_from_headers;
use super::{http_error_response, AppState};

async fn handle(state: &AppState, account_id: String, blob_id: String, headers: axum::http::HeaderMap) -> Response {
    let auth = auth_context_from_headers(&headers);
    let now = blob::types::now_millis();
    let cancel = tokio_util::sync::CancellationToken::new();

    match blob::download(&*state.store, &*state.signer, &state.registry.snapshot(), &account_id, &blob_id, &auth, now, &cancel).await {
        Ok(redirect) => {
            let mut response = StatusCode::FOUND.into_response();
            response.headers_mut().insert(
                axum::http::header::LOCATION,
                HeaderValue::from_str(&redirect.location).unwrap_or_else(|_| HeaderValue::from_static("")),
            );
            response.headers_mut().insert(axum::http::header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            response
        }
        Err(err) => http_error_response(err),
    }
}

pub async fn download_handler(
    State(state): State<AppState>,
    Path((account_id, blob_id)): Path<(String, String)>,
    headers: axum::http::HeaderMap,
) -> Response {
    handle(&state, account_id, blob_id, headers).await
}

pub async fn download_handler_iam(
    State(state): State<AppState>,
    Path((account_id, blob_id)): Path<(String, String)>,
    headers: axum::http::HeaderMap,
) -> Response {
    handle(&state, account_id, blob_id, headers).await
}
