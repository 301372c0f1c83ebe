//! Method-call envelope and the per-call context threaded through the
//! dispatcher pipeline.
//!
//! Grounded on the teacher's `OperationContext`/`Operation`/
//! `OperationResponse`/`OperationError` (`service/operation.rs`), replacing
//! the teacher's closed `CallerOrigin`/`service_name`-keyed variant set
//! with JMAP's open-ended `(name, args, callId)` triples (spec.md §2: the
//! registry, not a fixed enum, is the source of truth for which methods
//! exist).

use jmap_core::{AuthContext, MethodError};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// One `[name, args, callId]` entry from a JMAP `methodCalls` array.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub name: String,
    pub args: Value,
    pub call_id: String,
}

/// Parses a raw `methodCalls` JSON array into individual calls.
///
/// A malformed entry (not a 3-element `[name, args, callId]` array, or
/// with the wrong element types) produces a `serverFail` at that index
/// without aborting the rest of the batch (SPEC_FULL.md "envelope-shape
/// validation").
#[must_use]
pub fn parse_method_calls(raw: &Value) -> Vec<Result<MethodCall, MethodError>> {
    let Some(entries) = raw.as_array() else {
        return vec![Err(MethodError::server_fail("methodCalls must be an array"))];
    };
    entries.iter().map(parse_one_call).collect()
}

fn parse_one_call(entry: &Value) -> Result<MethodCall, MethodError> {
    let triple = entry
        .as_array()
        .filter(|arr| arr.len() == 3)
        .ok_or_else(|| MethodError::server_fail("method call must be a 3-element array"))?;
    let name = triple[0]
        .as_str()
        .ok_or_else(|| MethodError::server_fail("method call name must be a string"))?
        .to_string();
    let call_id = triple[2]
        .as_str()
        .ok_or_else(|| MethodError::server_fail("method call id must be a string"))?
        .to_string();
    Ok(MethodCall { name, args: triple[1].clone(), call_id })
}

/// Context carried with every operation through the pipeline.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub auth: AuthContext,
    pub call_timeout_ms: u64,
    pub cancel: CancellationToken,
}

/// One method call paired with its execution context.
#[derive(Debug, Clone)]
pub struct Operation {
    pub call: MethodCall,
    pub ctx: OperationContext,
}

/// Errors raised by the dispatch pipeline itself, as opposed to a JMAP
/// method's own business-logic error (carried as `Ok(Err(MethodError))`
/// in a successful dispatch, not as this type).
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("server overloaded, try again later")]
    Overloaded,
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error(transparent)]
    Method(#[from] MethodError),
}

impl OperationError {
    #[must_use]
    pub fn into_method_error(self) -> MethodError {
        match self {
            Self::Overloaded => MethodError::server_fail("server overloaded"),
            Self::Timeout { timeout_ms } => MethodError::server_fail(format!("timed out after {timeout_ms}ms")),
            Self::Method(e) => e,
        }
    }
}

/// A method's successful result: the `args` object of the `[name, args,
/// callId]` response triple.
pub type OperationResponse = Value;
