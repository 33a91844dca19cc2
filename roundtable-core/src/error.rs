// ABOUTME: Typed error for discussion turns with a kind, context and source chain
// ABOUTME: Every failure surfaced by the control maps to a report and the pause policy

use crate::events::ErrorReport;
use thiserror::Error;

/// Broad category of a discussion failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// An operation needed a current discussion and none was set
    NoDiscussion,
    /// The completion backend failed while producing a reply
    Generation,
    /// Executing or recording embedded actions failed
    Action,
    /// Reading or writing messages failed
    Store,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoDiscussion => "no_discussion",
            Self::Generation => "generation",
            Self::Action => "action",
            Self::Store => "store",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the control does after an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop the run; the user resumes explicitly
    Pause,
}

#[derive(Debug, Error)]
#[error("{context}")]
pub struct DiscussionError {
    kind: ErrorKind,
    context: String,
    #[source]
    source: Option<anyhow::Error>,
}

impl DiscussionError {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
            source: None,
        }
    }

    pub fn with_source(kind: ErrorKind, context: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            kind,
            context: context.into(),
            source: Some(source),
        }
    }

    pub fn no_discussion() -> Self {
        Self::new(ErrorKind::NoDiscussion, "No current discussion")
    }

    pub fn generation(source: anyhow::Error) -> Self {
        Self::with_source(ErrorKind::Generation, "Agent reply failed", source)
    }

    pub fn action(source: anyhow::Error) -> Self {
        Self::with_source(ErrorKind::Action, "Action execution failed", source)
    }

    pub fn store(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::with_source(ErrorKind::Store, context, source)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn policy(&self) -> ErrorPolicy {
        ErrorPolicy::Pause
    }

    /// Human-readable message including the full source chain
    pub fn detail(&self) -> String {
        match &self.source {
            Some(source) => format!("{}: {:#}", self.context, source),
            None => self.context.clone(),
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind,
            message: self.detail(),
            policy: self.policy(),
        }
    }
}

impl From<anyhow::Error> for DiscussionError {
    fn from(e: anyhow::Error) -> Self {
        // Already typed errors keep their kind
        match e.downcast::<DiscussionError>() {
            Ok(typed) => typed,
            Err(e) => Self::with_source(ErrorKind::Internal, "Unexpected failure", e),
        }
    }
}
