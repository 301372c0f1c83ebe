//! Identity extraction from an already-attested caller (spec.md §1: OIDC/
//! JWT validation and IAM-principal attestation are out of scope; the
//! HTTP/API-gateway shell in front of this service is assumed to have
//! already verified the caller and forwarded the result in these headers).
//!
//! `x-iam-principal` wins if present (set by the gateway for `-iam`
//! routes); otherwise `x-session-subject` (set for session-authenticated
//! routes); otherwise the caller is unauthenticated.

use axum::http::HeaderMap;

use jmap_core::AuthContext;

const IAM_PRINCIPAL_HEADER: &str = "x-iam-principal";
const SESSION_SUBJECT_HEADER: &str = "x-session-subject";

#[must_use]
pub fn auth_context_from_headers(headers: &HeaderMap) -> AuthContext {
    if let Some(principal) = headers.get(IAM_PRINCIPAL_HEADER).and_then(|v| v.to_str().ok()) {
        return AuthContext::Iam { principal: principal.to_string() };
    }
    if let Some(subject) = headers.get(SESSION_SUBJECT_HEADER).and_then(|v| v.to_str().ok()) {
        return AuthContext::Session { subject: subject.to_string() };
    }
    AuthContext::Unauthenticated
}
