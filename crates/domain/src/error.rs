//! Shared error taxonomy for the turn engine and everything built on it.
//!
//! Every crate that touches the turn/block store, the provider adapters, or
//! the HTTP surface returns this `Error`. The gateway is the single place
//! that maps variants to HTTP status codes; nothing downstream of the store
//! or executor should need to know about `StatusCode`.

/// Normalized provider failure category (mirrors the provider-agnostic
/// error shape every `LlmProvider` adapter must emit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorCategory {
    RateLimit,
    Auth,
    InvalidRequest,
    Overloaded,
    Transient,
    Fatal,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("provider [{category:?}] {provider}: {message}")]
    Provider {
        provider: String,
        category: ProviderErrorCategory,
        message: String,
    },

    #[error("tool error: {0}")]
    Tool(String),

    #[error("persistence: {0}")]
    Persistence(String),

    #[error("tool loop exhausted after {0} iterations")]
    ToolLoopExhausted(usize),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("config: {0}")]
    Config(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// A short machine-readable category tag, used in the `turn_error` SSE
    /// payload and the HTTP error body so clients can branch without
    /// string-matching `Display` output.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Unauthorized(_) => "unauthorized",
            Error::Conflict(_) => "conflict",
            Error::Provider { .. } => "provider",
            Error::Tool(_) => "tool",
            Error::Persistence(_) => "persistence",
            Error::ToolLoopExhausted(_) => "tool_loop_exhausted",
            Error::Timeout(_) => "timeout",
            Error::Cancelled => "cancelled",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Other(_) => "other",
        }
    }
}
