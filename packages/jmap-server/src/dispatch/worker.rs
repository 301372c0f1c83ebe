//! Batch executor: runs one request's `methodCalls` to completion,
//! respecting intra-batch result-reference dependencies and the
//! worker-pool concurrency bound ("size P", spec.md §5), while preserving
//! the input order of the output `methodResponses`.
//!
//! The teacher's `worker.rs` (`BackgroundWorker`/`BackgroundRunnable`) was
//! a stub for periodic background tasks, not call execution, so this
//! module has no direct teacher analogue; the bounded-parallelism
//! mechanism (a `tokio::sync::Semaphore` gating concurrent spawns) is
//! grounded on the same semaphore-based backpressure idiom the teacher
//! uses in `LoadShedLayer` (`service/middleware/load_shed.rs`), applied
//! here to cap the per-batch worker pool rather than the whole server.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tower::Service;

use jmap_core::MethodError;

use super::operation::{MethodCall, Operation, OperationContext, OperationResponse};
use super::resolver::{self, PriorCallOutcome};

/// One entry of the `methodResponses` array: `[name, args, callId]`, where
/// `name` is `"error"` for a failed call.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodResponse {
    pub name: String,
    pub args: Value,
    pub call_id: String,
}

impl MethodResponse {
    fn error(call_id: String, err: &MethodError) -> Self {
        Self { name: "error".into(), args: err.to_json(), call_id }
    }
}

/// Runs every call in `calls` (already parsed; malformed entries already
/// surfaced as `Err`) to completion.
///
/// `pipeline_factory` is called once per dispatched call to get a pipeline
/// instance — the pipeline (`Service<Operation>`) isn't `Clone`-required
/// to be shared across concurrent tasks this way, since each call to the
/// factory hands back an owned clone.
pub async fn execute_batch<S>(
    calls: Vec<Result<MethodCall, MethodError>>,
    ctx_for: impl Fn(&MethodCall) -> OperationContext,
    pipeline_factory: impl Fn() -> S + Send + Sync,
    worker_pool_size: usize,
) -> Vec<MethodResponse>
where
    S: Service<Operation, Response = OperationResponse, Error = super::operation::OperationError> + Send + 'static,
    S::Future: Send + 'static,
{
    let mut responses: Vec<Option<MethodResponse>> = vec![None; calls.len()];
    let mut pending: HashSet<usize> = HashSet::new();
    let mut pending_call_ids: HashSet<String> = HashSet::new();
    // `PriorCallOutcome` borrows, so the actual results are owned here and
    // handed out as references freshly built each round.
    let mut completed_values: HashMap<String, Value> = HashMap::new();
    let mut completed_names: HashMap<String, String> = HashMap::new();

    // A call may only reference a call at a strictly earlier index
    // (spec.md §9: "call i depends on call j<i"). Check this up front,
    // against array position rather than mere completion order, so a
    // forward or self reference fails immediately instead of happening to
    // succeed whenever the referenced call finishes first.
    let id_to_index: HashMap<String, usize> =
        calls.iter().enumerate().filter_map(|(idx, c)| c.as_ref().ok().map(|call| (call.call_id.clone(), idx))).collect();

    for (idx, call) in calls.iter().enumerate() {
        match call {
            Ok(c) => {
                let is_forward_or_self_reference = resolver::scan_references(&c.args)
                    .map(|refs| resolver::dependency_ids(&refs))
                    .map(|deps| deps.iter().any(|d| id_to_index.get(d).is_some_and(|&dep_idx| dep_idx >= idx)))
                    .unwrap_or(false);
                if is_forward_or_self_reference {
                    responses[idx] = Some(MethodResponse::error(
                        c.call_id.clone(),
                        &MethodError::invalid_result_reference("referenced call is not at an earlier index"),
                    ));
                } else {
                    pending.insert(idx);
                    pending_call_ids.insert(c.call_id.clone());
                }
            }
            Err(e) => responses[idx] = Some(MethodResponse::error(String::new(), e)),
        }
    }

    let semaphore = Arc::new(Semaphore::new(worker_pool_size.max(1)));

    while !pending.is_empty() {
        let prior: HashMap<String, PriorCallOutcome<'_>> = completed_names
            .iter()
            .map(|(id, name)| {
                (id.clone(), PriorCallOutcome { method_name: name.as_str(), result: completed_values.get(id) })
            })
            .collect();

        let ready: Vec<usize> = pending
            .iter()
            .copied()
            .filter(|idx| {
                let call = calls[*idx].as_ref().expect("pending indices are always Ok calls");
                match resolver::scan_references(&call.args) {
                    Ok(refs) => {
                        let deps = resolver::dependency_ids(&refs);
                        deps.iter().all(|d| !pending_call_ids.contains(d))
                    }
                    Err(_) => true,
                }
            })
            .collect();

        if ready.is_empty() {
            // Every remaining call depends on another remaining call: a
            // cycle. Fail them all rather than deadlocking.
            for idx in pending.drain() {
                let call = calls[idx].as_ref().expect("pending indices are always Ok calls");
                pending_call_ids.remove(&call.call_id);
                responses[idx] = Some(MethodResponse::error(
                    call.call_id.clone(),
                    &MethodError::invalid_result_reference("cyclic result reference"),
                ));
            }
            break;
        }

        let mut join_set = tokio::task::JoinSet::new();
        for idx in ready {
            pending.remove(&idx);
            let call = calls[idx].clone().expect("ready indices are always Ok calls");
            pending_call_ids.remove(&call.call_id);
            let ctx = ctx_for(&call);

            let refs = resolver::scan_references(&call.args);
            let resolved_args = refs.and_then(|refs| resolver::resolve_references(&call.args, &refs, &prior));

            let permit = Arc::clone(&semaphore);
            let mut pipeline = pipeline_factory();
            join_set.spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore not closed");
                let outcome = match resolved_args {
                    Ok(args) => {
                        let op = Operation { call: MethodCall { name: call.name.clone(), args, call_id: call.call_id.clone() }, ctx };
                        match std::future::poll_fn(|cx| pipeline.poll_ready(cx)).await {
                            Ok(()) => pipeline.call(op).await.map_err(super::operation::OperationError::into_method_error),
                            Err(e) => Err(e.into_method_error()),
                        }
                    }
                    Err(e) => Err(e),
                };
                (idx, call.name, call.call_id, outcome)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let (idx, name, call_id, outcome) = joined.expect("dispatch task does not panic");
            match outcome {
                Ok(args) => {
                    completed_values.insert(call_id.clone(), args.clone());
                    completed_names.insert(call_id.clone(), name.clone());
                    responses[idx] = Some(MethodResponse { name, args, call_id });
                }
                Err(err) => {
                    completed_names.insert(call_id.clone(), "error".into());
                    responses[idx] = Some(MethodResponse::error(call_id, &err));
                }
            }
        }
    }

    responses.into_iter().map(|r| r.expect("every call produces exactly one response")).collect()
}
