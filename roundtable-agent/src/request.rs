// ABOUTME: Prompt messages and completion requests handed to backends.
// ABOUTME: Each request carries a unique id so an in-flight stream can be cancelled.

use serde::{Deserialize, Serialize};

/// Role of a prompt message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

/// A single message in a prepared prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
    /// Speaker name for multi-party transcripts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
            name: None,
        }
    }

    /// Attach a speaker name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A prepared prompt ready to be streamed by a backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRequest {
    /// Unique request id, used for cancellation
    pub id: String,
    /// Agent the reply is generated for (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub messages: Vec<PromptMessage>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<PromptMessage>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: None,
            messages,
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Flatten the prompt into one string, used for pattern matching and logging
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The content of the last non-system message, if any
    pub fn last_turn(&self) -> Option<&PromptMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role != PromptRole::System)
    }
}
