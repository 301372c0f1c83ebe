//! Intra-batch result-reference resolution (spec.md §2, §9): a method
//! call's arguments may reference a prior call's result via a
//! `"#propertyName": {"resultOf": callId, "name": methodName, "path":
//! jsonPointer}` entry instead of a literal `"propertyName"` value.
//!
//! No teacher analogue — grounded directly on the REDESIGN note in
//! spec.md §9 ("pre-scan for `#`-prefixed keys... build a dependency
//! graph... a pure function over the opaque value tree").

use std::collections::{HashMap, HashSet};

use jmap_core::{pointer, MethodError};
use serde_json::Value;

/// One `#`-prefixed reference found in a call's `args`.
#[derive(Debug, Clone)]
pub struct ResultRef {
    /// The argument key this reference will populate (without the `#`).
    pub property: String,
    pub result_of: String,
    pub method_name: String,
    pub path: String,
}

/// Scans `args` for `#`-prefixed reference entries.
///
/// # Errors
///
/// Returns `invalidArguments` if both `k` and `#k` are present for the
/// same property (spec.md §2: ambiguous — a literal and a reference to
/// the same slot), or if a `#k` entry is not a well-formed reference
/// object.
pub fn scan_references(args: &Value) -> Result<Vec<ResultRef>, MethodError> {
    let Some(obj) = args.as_object() else {
        return Ok(Vec::new());
    };
    let mut refs = Vec::new();
    for (key, value) in obj {
        let Some(property) = key.strip_prefix('#') else { continue };
        if obj.contains_key(property) {
            return Err(MethodError::invalid_arguments_because(format!(
                "both '{property}' and '#{property}' given"
            )));
        }
        let result_of = value
            .get("resultOf")
            .and_then(Value::as_str)
            .ok_or_else(|| MethodError::invalid_arguments_because(format!("'#{property}' missing resultOf")))?
            .to_string();
        let method_name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| MethodError::invalid_arguments_because(format!("'#{property}' missing name")))?
            .to_string();
        let path = value
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| MethodError::invalid_arguments_because(format!("'#{property}' missing path")))?
            .to_string();
        refs.push(ResultRef { property: property.to_string(), result_of, method_name, path });
    }
    Ok(refs)
}

/// The dependency set (call ids) a set of references implies.
#[must_use]
pub fn dependency_ids(refs: &[ResultRef]) -> HashSet<String> {
    refs.iter().map(|r| r.result_of.clone()).collect()
}

/// The outcome of a prior call in the batch, as seen by the resolver: its
/// method name (to check against a reference's expected `name`) and its
/// result, if it succeeded.
pub struct PriorCallOutcome<'a> {
    pub method_name: &'a str,
    pub result: Option<&'a Value>,
}

/// Substitutes every `#k` reference in `args` with the value it resolves
/// to against the referenced prior call's result, producing the concrete
/// argument object the method handler will see.
///
/// # Errors
///
/// Returns `invalidResultReference` if the referenced call is missing,
/// named a different method than actually ran, failed, or the pointer
/// path didn't resolve to anything in its result.
pub fn resolve_references(
    args: &Value,
    refs: &[ResultRef],
    prior: &HashMap<String, PriorCallOutcome<'_>>,
) -> Result<Value, MethodError> {
    let mut resolved = args.as_object().cloned().unwrap_or_default();
    for r in refs {
        resolved.remove(&format!("#{}", r.property));
        let outcome = prior.get(&r.result_of).ok_or_else(|| {
            MethodError::invalid_result_reference(format!("no such call id '{}'", r.result_of))
        })?;
        if outcome.method_name != r.method_name {
            return Err(MethodError::invalid_result_reference(format!(
                "call '{}' is '{}', not '{}'",
                r.result_of, outcome.method_name, r.method_name
            )));
        }
        let Some(result) = outcome.result else {
            return Err(MethodError::invalid_result_reference(format!(
                "call '{}' did not succeed", r.result_of
            )));
        };
        let value = pointer::resolve(result, &r.path).ok_or_else(|| {
            MethodError::invalid_result_reference(format!("path '{}' did not resolve in '{}'", r.path, r.result_of))
        })?;
        resolved.insert(r.property.clone(), value);
    }
    Ok(Value::Object(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sibling_literal_and_reference_is_rejected() {
        let args = json!({
            "blobId": "b1",
            "#blobId": {"resultOf": "c0", "name": "Blob/allocate", "path": "/id"}
        });
        assert!(scan_references(&args).is_err());
    }

    #[test]
    fn resolves_reference_against_prior_result() {
        let args = json!({"#blobId": {"resultOf": "c0", "name": "Blob/allocate", "path": "/id"}});
        let refs = scan_references(&args).unwrap();
        let prior_result = json!({"id": "blob-123"});
        let mut prior = HashMap::new();
        prior.insert("c0".to_string(), PriorCallOutcome { method_name: "Blob/allocate", result: Some(&prior_result) });

        let resolved = resolve_references(&args, &refs, &prior).unwrap();
        assert_eq!(resolved.get("blobId").unwrap(), "blob-123");
        assert!(resolved.get("#blobId").is_none());
    }

    #[test]
    fn mismatched_method_name_is_invalid_reference() {
        let args = json!({"#blobId": {"resultOf": "c0", "name": "Blob/delete", "path": "/id"}});
        let refs = scan_references(&args).unwrap();
        let prior_result = json!({"id": "blob-123"});
        let mut prior = HashMap::new();
        prior.insert("c0".to_string(), PriorCallOutcome { method_name: "Blob/allocate", result: Some(&prior_result) });
        assert!(resolve_references(&args, &refs, &prior).is_err());
    }

    #[test]
    fn failed_prior_call_is_invalid_reference() {
        let args = json!({"#blobId": {"resultOf": "c0", "name": "Blob/allocate", "path": "/id"}});
        let refs = scan_references(&args).unwrap();
        let mut prior = HashMap::new();
        prior.insert("c0".to_string(), PriorCallOutcome { method_name: "Blob/allocate", result: None });
        assert!(resolve_references(&args, &refs, &prior).is_err());
    }
}
