//! Already-attested caller identity.
//!
//! OIDC/JWT validation and IAM-principal attestation are out of scope
//! (spec.md §1): this module only models the identity the HTTP shell has
//! *already validated* by the time it reaches the dispatcher or an HTTP
//! endpoint handler.

/// The authenticated caller of a request, as handed to us by the (external)
/// HTTP/API-gateway shell.
///
/// Exactly one variant is populated per spec.md §4.9's identity-selection
/// rule: an IAM principal, or a session with a subject claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthContext {
    /// Request carries an IAM principal (ARN/id), used by `-iam` endpoints.
    Iam { principal: String },
    /// Request carries a session with a subject claim (the account id the
    /// session belongs to).
    Session { subject: String },
    /// No identity could be established.
    Unauthenticated,
}

impl AuthContext {
    #[must_use]
    pub fn iam_principal(&self) -> Option<&str> {
        match self {
            Self::Iam { principal } => Some(principal),
            _ => None,
        }
    }

    #[must_use]
    pub fn session_subject(&self) -> Option<&str> {
        match self {
            Self::Session { subject } => Some(subject),
            _ => None,
        }
    }
}

/// Canonicalizes an IAM principal identity for registry comparison
/// (spec.md §4.2, §9): strips a session/role-assumption suffix of the form
/// `.../session-name` under an `assumed-role` ARN segment, so a temporary
/// credential matches its base role.
///
/// Example: `arn:aws:sts::111122223333:assumed-role/MyRole/session-name`
/// canonicalizes to `arn:aws:iam::111122223333:role/MyRole`.
#[must_use]
pub fn canonicalize_principal(id: &str) -> String {
    const STS_MARKER: &str = ":sts::";
    const ASSUMED_ROLE_MARKER: &str = ":assumed-role/";

    if let (Some(sts_idx), Some(role_idx)) =
        (id.find(STS_MARKER), id.find(ASSUMED_ROLE_MARKER))
    {
        if role_idx > sts_idx {
            let account_start = sts_idx + STS_MARKER.len();
            let account_end = id[account_start..].find(':').map(|i| account_start + i);
            if let Some(account_end) = account_end {
                let account_id = &id[account_start..account_end];
                let after_marker = &id[role_idx + ASSUMED_ROLE_MARKER.len()..];
                let role_name = after_marker.split('/').next().unwrap_or(after_marker);
                return format!("arn:aws:iam::{account_id}:role/{role_name}");
            }
        }
    }
    id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_assumed_role_arn() {
        let assumed = "arn:aws:sts::111122223333:assumed-role/MyRole/session-name";
        assert_eq!(
            canonicalize_principal(assumed),
            "arn:aws:iam::111122223333:role/MyRole"
        );
    }

    #[test]
    fn literal_role_arn_passes_through_unchanged() {
        let literal = "arn:aws:iam::111122223333:role/MyRole";
        assert_eq!(canonicalize_principal(literal), literal);
    }

    #[test]
    fn unrelated_string_passes_through_unchanged() {
        assert_eq!(canonicalize_principal("user-42"), "user-42");
    }
}
