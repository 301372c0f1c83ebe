//! `POST /jmap`, `POST /jmap-iam/{accountId}`: the JMAP method-call
//! dispatch endpoint (spec.md §2, §6). Both routes share the same body
//! shape and dispatch core; the `-iam` path segment only affects which
//! identity header the gateway is expected to have populated.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use jmap_core::ProblemDetails;

use crate::dispatch::middleware::build_dispatch_pipeline;
use crate::dispatch::{
    self, BlobAllocateHandler, BlobCompleteHandler, DispatcherConfig, MethodRouter, OperationContext,
};

use super::auth::auth_context_from_headers;
use super::{problem_response, AppState};

fn build_router(state: &AppState) -> MethodRouter {
    let mut router = MethodRouter::new(Arc::clone(&state.registry));
    router.register(
        "Blob/allocate",
        Arc::new(BlobAllocateHandler {
            store: Arc::clone(&state.store),
            objects: Arc::clone(&state.objects),
            config: (*state.allocate_config).clone(),
        }),
    );
    router.register(
        "Blob/complete",
        Arc::new(BlobCompleteHandler { store: Arc::clone(&state.store), objects: Arc::clone(&state.objects) }),
    );
    router
}

async fn dispatch_request(state: &AppState, headers: &HeaderMap, body: Value) -> Response {
    let Some(using) = body.get("using").and_then(Value::as_array) else {
        return problem_response(&ProblemDetails::not_json());
    };
    let snapshot = state.registry.snapshot();
    for uri in using {
        let Some(uri) = uri.as_str() else { return problem_response(&ProblemDetails::not_json()) };
        if !snapshot.has_capability(uri) {
            return problem_response(&ProblemDetails::unknown_capability(uri));
        }
    }

    let Some(raw_calls) = body.get("methodCalls") else {
        return problem_response(&ProblemDetails::not_json());
    };
    let calls = dispatch::parse_method_calls(raw_calls);

    let auth = auth_context_from_headers(headers);
    let call_timeout_ms = state.dispatcher_config.default_call_timeout_ms;
    let ctx_for = move |_call: &dispatch::MethodCall| OperationContext {
        auth: auth.clone(),
        call_timeout_ms,
        cancel: CancellationToken::new(),
    };

    let router = build_router(state);
    let dispatcher_config: Arc<DispatcherConfig> = Arc::clone(&state.dispatcher_config);
    let pipeline_factory = move || build_dispatch_pipeline(router.clone(), &dispatcher_config);

    let responses =
        dispatch::execute_batch(calls, ctx_for, pipeline_factory, state.dispatcher_config.worker_pool_size).await;

    let method_responses: Vec<Value> = responses
        .into_iter()
        .map(|r| serde_json::json!([r.name, r.args, r.call_id]))
        .collect();

    Json(serde_json::json!({"methodResponses": method_responses, "sessionState": "0"})).into_response()
}

pub async fn jmap_handler(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    dispatch_request(&state, &headers, body).await
}

pub async fn jmap_handler_iam(
    State(state): State<AppState>,
    Path(_account_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    dispatch_request(&state, &headers, body).await
}
