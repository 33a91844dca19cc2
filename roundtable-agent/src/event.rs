// ABOUTME: Event types emitted by completion backends while streaming a reply.
// ABOUTME: Text chunks, terminal completion with usage, and typed errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events emitted by completion backends during a streamed reply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CompletionEvent {
    /// Streaming text chunk to append to the reply
    Chunk(String),

    /// The backend finished producing the reply
    Done {
        /// Token usage and cost (if available)
        usage: Option<Usage>,
    },

    /// Error occurred while producing the reply
    Error {
        /// Typed error code for programmatic handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Whether the error is recoverable (can retry)
        recoverable: bool,
    },
}

impl CompletionEvent {
    /// Shorthand for a text chunk
    pub fn chunk(text: impl Into<String>) -> Self {
        Self::Chunk(text.into())
    }

    /// Shorthand for a completion without usage data
    pub fn done() -> Self {
        Self::Done { usage: None }
    }

    /// Returns true if this event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// Typed error codes for programmatic handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    /// Request timed out
    Timeout,
    /// Rate limited by the backend
    RateLimited,
    /// Authentication failed
    AuthFailed,
    /// Prompt was rejected (too long, malformed, filtered)
    InvalidRequest,
    /// Backend-specific error
    BackendError,
    /// Unknown error
    Unknown,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::AuthFailed => "auth_failed",
            Self::InvalidRequest => "invalid_request",
            Self::BackendError => "backend_error",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Token usage and cost tracking
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    /// Input tokens consumed
    pub input_tokens: u64,
    /// Output tokens generated
    pub output_tokens: u64,
    /// Total cost in USD
    pub cost_usd: Option<f64>,
    /// Backend-specific usage data
    pub extra: Option<Value>,
}
