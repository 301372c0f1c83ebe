//! HTTP handler definitions for the JMAP blob service.
//!
//! Defines `AppState` (the shared state carried through axum extractors)
//! and re-exports all handler functions for convenient access when
//! building the router.

pub mod auth;
pub mod delete_blob;
pub mod download;
pub mod health;
pub mod jmap;
pub mod upload;

pub use delete_blob::delete_handler_iam;
pub use download::{download_handler, download_handler_iam};
pub use health::{health_handler, liveness_handler, readiness_handler};
pub use jmap::{jmap_handler, jmap_handler_iam};
pub use upload::{upload_handler, upload_handler_iam};

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use jmap_core::{HttpError, ProblemDetails};

use crate::blob::{AllocateConfig, HmacUrlSigner};
use crate::dispatch::DispatcherConfig;
use crate::registry::RegistryHandle;
use crate::store::object::ObjectStore;
use crate::store::MetadataStore;

use super::{NetworkConfig, ShutdownController};

/// Shared application state passed to all axum handlers via `State` extraction.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetadataStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub registry: Arc<RegistryHandle>,
    pub dispatcher_config: Arc<DispatcherConfig>,
    pub allocate_config: Arc<AllocateConfig>,
    pub signer: Arc<HmacUrlSigner>,
    pub shutdown: Arc<ShutdownController>,
    pub config: Arc<NetworkConfig>,
    pub start_time: Instant,
}

/// Renders a top-level envelope failure as `application/problem+json`
/// (spec.md §6/§7). `ProblemDetails` lives in `jmap-core`, which has no
/// axum dependency, so the `IntoResponse` conversion lives here instead.
#[must_use]
pub fn problem_response(details: &ProblemDetails) -> Response {
    let status = StatusCode::from_u16(details.status).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(details)).into_response()
}

/// Renders an `HttpError` as a bare status code with a small JSON body,
/// for the non-JMAP-method endpoints (download, legacy upload, delete).
#[must_use]
pub fn http_error_response(err: HttpError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}
