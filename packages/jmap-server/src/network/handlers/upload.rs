//! `POST /upload/{accountId}`, `POST /upload-iam/{accountId}`: legacy
//! server-mediated direct upload (RFC 8620 §6.1, spec.md §6).

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use jmap_core::HttpError;

use crate::blob::{self, UploadInput};

use super::auth::auth_context_from_headers;
use super::{http_error_response, AppState};

const CONTENT_TYPE_HEADER: &str = "content-type";
const X_PARENT_HEADER: &str = "x-parent";
const X_PARENT_MAX_LEN: usize = 128;

/// Validates the `X-Parent` header (spec.md §6): printable ASCII, at most
/// 128 characters, drawn from a restricted charset so it's safe to fold
/// into downstream storage keys without further escaping. Returns the
/// header's value so the caller can carry it through to the object's
/// `Parent` tag (spec.md §3) — absent if the header wasn't sent.
fn validate_x_parent(headers: &HeaderMap) -> Result<Option<String>, HttpError> {
    let Some(value) = headers.get(X_PARENT_HEADER) else { return Ok(None) };
    let value = value.to_str().map_err(|_| HttpError::BadRequest)?;
    if value.len() > X_PARENT_MAX_LEN {
        return Err(HttpError::BadRequest);
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || " \t\n\r+-=._:/@".contains(c);
    if !value.chars().all(allowed) {
        return Err(HttpError::BadRequest);
    }
    Ok(Some(value.to_string()))
}

async fn handle(state: &AppState, account_id: String, headers: HeaderMap, body: Bytes) -> Response {
    let parent = match validate_x_parent(&headers) {
        Ok(parent) => parent,
        Err(e) => return http_error_response(e),
    };
    let content_type = headers
        .get(CONTENT_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let is_iam_auth = matches!(auth_context_from_headers(&headers), jmap_core::AuthContext::Iam { .. });

    let input = UploadInput { account_id: account_id.clone(), content_type, body: body.to_vec(), is_iam_auth, parent };
    match blob::upload(&*state.store, &*state.objects, input, &tokio_util::sync::CancellationToken::new()).await {
        Ok(result) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "accountId": account_id,
                "blobId": result.blob_id,
                "type": result.content_type,
                "size": result.size,
            })),
        )
            .into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, Json(err.to_json())).into_response(),
    }
}

pub async fn upload_handler(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle(&state, account_id, headers, body).await
}

pub async fn upload_handler_iam(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle(&state, account_id, headers, body).await
}
