//! JSON-pointer-with-wildcard resolution for dispatcher result references.
//!
//! Implements RFC 6901 JSON Pointer extended with a `*` wildcard segment
//! (spec.md §4.3 step 4): a `*` segment means "for every element of the
//! current array, descend", and wildcard evaluation yields a flat list
//! (e.g. `/list/*/id` returns the `id` of each element of `/list`).
//!
//! This is a pure function over `serde_json::Value` — the "opaque
//! tagged-value tree" spec.md §9 calls for is just JSON here, since JMAP's
//! wire format already is JSON.

use serde_json::Value;

/// Resolve a result-reference JSON pointer against a prior response's args.
///
/// Returns `None` if any segment fails to resolve (missing object key,
/// out-of-range/non-numeric array index, or indexing into a scalar).
#[must_use]
pub fn resolve(root: &Value, path: &str) -> Option<Value> {
    let segments = split_pointer(path);
    resolve_segments(root, &segments)
}

fn split_pointer(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed
        .split('/')
        .map(|seg| seg.replace("~1", "/").replace("~0", "~"))
        .collect()
}

fn resolve_segments(current: &Value, segments: &[String]) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(current.clone());
    };

    if head == "*" {
        let array = current.as_array()?;
        let mut out = Vec::with_capacity(array.len());
        for item in array {
            match resolve_segments(item, rest) {
                Some(Value::Array(mut items)) if rest_has_wildcard(rest) => out.append(&mut items),
                Some(v) => out.push(v),
                None => return None,
            }
        }
        return Some(Value::Array(out));
    }

    match current {
        Value::Object(map) => {
            let next = map.get(head.as_str())?;
            resolve_segments(next, rest)
        }
        Value::Array(arr) => {
            let idx: usize = head.parse().ok()?;
            let next = arr.get(idx)?;
            resolve_segments(next, rest)
        }
        _ => None,
    }
}

fn rest_has_wildcard(rest: &[String]) -> bool {
    rest.iter().any(|s| s == "*")
}
