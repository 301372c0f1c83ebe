//! JMAP-layer and HTTP-layer error taxonomy.
//!
//! `MethodError` covers the per-call error kinds returned inside a JMAP
//! `methodResponses` entry (spec.md §7). `HttpError` covers the status
//! codes the outer HTTP shell raises for endpoints that aren't a JMAP
//! method call (download, legacy upload, delete). `ProblemDetails` is the
//! `application/problem+json` body used for top-level envelope failures.

use serde::Serialize;

/// Error kinds returned as `["error", {type, description?, properties?}, clientId]`
/// within a JMAP method response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MethodError {
    #[error("invalid arguments")]
    InvalidArguments { description: Option<String> },

    #[error("invalid properties: {properties:?}")]
    InvalidProperties {
        properties: Vec<String>,
        description: Option<String>,
    },

    #[error("invalid result reference")]
    InvalidResultReference { description: Option<String> },

    #[error("unknown method")]
    UnknownMethod,

    #[error("unknown capability")]
    UnknownCapability,

    #[error("account not found")]
    AccountNotFound,

    #[error("too large")]
    TooLarge,

    #[error("too many pending allocations")]
    TooManyPending,

    #[error("over quota")]
    OverQuota,

    #[error("account not provisioned")]
    AccountNotProvisioned,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("server failure")]
    ServerFail { description: Option<String> },
}

impl MethodError {
    /// The JMAP-wire `type` string, e.g. `"invalidArguments"`.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::InvalidArguments { .. } => "invalidArguments",
            Self::InvalidProperties { .. } => "invalidProperties",
            Self::InvalidResultReference { .. } => "invalidResultReference",
            Self::UnknownMethod => "unknownMethod",
            Self::UnknownCapability => "unknownCapability",
            Self::AccountNotFound => "accountNotFound",
            Self::TooLarge => "tooLarge",
            Self::TooManyPending => "tooManyPending",
            Self::OverQuota => "overQuota",
            Self::AccountNotProvisioned => "accountNotProvisioned",
            Self::Forbidden => "forbidden",
            Self::NotFound => "notFound",
            Self::ServerFail { .. } => "serverFail",
        }
    }

    #[must_use]
    pub fn invalid_arguments() -> Self {
        Self::InvalidArguments { description: None }
    }

    #[must_use]
    pub fn invalid_arguments_because(description: impl Into<String>) -> Self {
        Self::InvalidArguments { description: Some(description.into()) }
    }

    #[must_use]
    pub fn invalid_result_reference(description: impl Into<String>) -> Self {
        Self::InvalidResultReference { description: Some(description.into()) }
    }

    #[must_use]
    pub fn server_fail(description: impl Into<String>) -> Self {
        Self::ServerFail {
            description: Some(description.into()),
        }
    }

    /// Renders this error into the JSON object carried as the `args` slot
    /// of an `["error", args, clientId]` method response.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("type".into(), serde_json::Value::String(self.type_name().into()));
        match self {
            Self::InvalidArguments { description } | Self::ServerFail { description } => {
                if let Some(d) = description {
                    obj.insert("description".into(), serde_json::Value::String(d.clone()));
                }
            }
            Self::InvalidProperties { properties, description } => {
                obj.insert(
                    "properties".into(),
                    serde_json::Value::Array(
                        properties.iter().cloned().map(serde_json::Value::String).collect(),
                    ),
                );
                if let Some(d) = description {
                    obj.insert("description".into(), serde_json::Value::String(d.clone()));
                }
            }
            Self::InvalidResultReference { description } => {
                if let Some(d) = description {
                    obj.insert("description".into(), serde_json::Value::String(d.clone()));
                }
            }
            _ => {}
        }
        serde_json::Value::Object(obj)
    }
}

/// HTTP-layer status for non-JMAP-method endpoints (download, delete, legacy upload).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HttpError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("bad request")]
    BadRequest,
    #[error("internal server error")]
    Internal,
}

impl HttpError {
    #[must_use]
    pub fn status_code(self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::BadRequest => 400,
            Self::Internal => 500,
        }
    }
}

/// `application/problem+json` body for top-level envelope failures
/// (spec.md §6/§7): malformed JSON, unknown capability in `using`, etc.
#[derive(Debug, Clone, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProblemDetails {
    #[must_use]
    pub fn new(kind: &str, status: u16, detail: Option<String>) -> Self {
        Self {
            problem_type: format!("urn:ietf:params:jmap:error:{kind}"),
            status,
            detail,
        }
    }

    #[must_use]
    pub fn not_json() -> Self {
        Self::new("notJSON", 400, None)
    }

    #[must_use]
    pub fn unknown_capability(uri: &str) -> Self {
        Self::new("unknownCapability", 400, Some(format!("unknown capability: {uri}")))
    }
}
