// ABOUTME: Data model for discussions: agents, members, settings and messages.
// ABOUTME: Messages are a tagged union of normal text turns and action result reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Author id used for messages typed by the human participant
pub const USER_AGENT_ID: &str = "user";
/// Author id used for messages produced by the discussion engine itself
pub const SYSTEM_AGENT_ID: &str = "system";

// =============================================================================
// Agents and Members
// =============================================================================

/// Role an agent plays in a discussion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Moderator,
    Participant,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Moderator => "moderator",
            Self::Participant => "participant",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "moderator" => Ok(Self::Moderator),
            "participant" => Ok(Self::Participant),
            other => anyhow::bail!("Unknown agent role: {}", other),
        }
    }
}

/// Read-only description of an agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDef {
    pub id: String,
    /// Display name, may change or be localized
    pub name: String,
    /// Stable identifier used in @-mentions
    pub slug: String,
    pub role: AgentRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expertise: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_style: Option<String>,
    /// Free-form extra instructions appended to the system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl AgentDef {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        slug: impl Into<String>,
        role: AgentRole,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            slug: slug.into(),
            role,
            personality: None,
            expertise: Vec::new(),
            bias: None,
            response_style: None,
            instructions: None,
        }
    }

    pub fn is_moderator(&self) -> bool {
        self.role == AgentRole::Moderator
    }
}

/// An agent enrolled in a discussion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    pub agent_id: String,
    /// Eligible to speak without being mentioned
    #[serde(default, alias = "auto_reply")]
    pub is_auto_reply: bool,
}

impl Member {
    pub fn new(agent_id: impl Into<String>, is_auto_reply: bool) -> Self {
        Self {
            agent_id: agent_id.into(),
            is_auto_reply,
        }
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Per-discussion settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Maximum turns per run; anything below 1 or non-numeric counts as 1
    #[serde(default = "default_max_rounds", deserialize_with = "lenient_number")]
    pub max_rounds: f64,
    /// Explicit action permission per role; unset roles fall back to moderator-only
    #[serde(default)]
    pub tool_permissions: HashMap<AgentRole, bool>,
}

fn default_max_rounds() -> f64 {
    10.0
}

/// Accept numbers and numeric strings; anything else becomes NaN and is
/// coerced to a limit of 1 by `round_limit`.
fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    })
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            tool_permissions: HashMap::new(),
        }
    }
}

impl Settings {
    pub fn with_max_rounds(mut self, max_rounds: f64) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_tool_permission(mut self, role: AgentRole, allowed: bool) -> Self {
        self.tool_permissions.insert(role, allowed);
        self
    }

    /// Effective round limit: `max(1, floor(max_rounds))`, infinity meaning unbounded
    pub fn round_limit(&self) -> usize {
        // Float-to-int casts saturate, so +inf lands on usize::MAX
        if self.max_rounds >= 1.0 {
            self.max_rounds.floor() as usize
        } else {
            1
        }
    }

    /// Whether agents with `role` may execute embedded actions
    pub fn can_use_actions(&self, role: AgentRole) -> bool {
        match self.tool_permissions.get(&role) {
            Some(allowed) => *allowed,
            None => role == AgentRole::Moderator,
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Lifecycle status of a text message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Streaming,
    Completed,
    Error,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Streaming => write!(f, "streaming"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A text turn authored by the user, an agent, or the system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalMessage {
    pub id: String,
    pub discussion_id: String,
    pub agent_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<DateTime<Utc>>,
}

/// Outcome of one executed action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Error,
}

/// One entry of an action result report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub operation_id: String,
    pub capability: String,
    pub description: String,
    pub params: Value,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Report of the actions embedded in an agent reply; always authored by `system`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResultMessage {
    pub id: String,
    pub discussion_id: String,
    pub agent_id: String,
    pub origin_message_id: String,
    pub results: Vec<ActionResult>,
    pub timestamp: DateTime<Utc>,
}

/// A message in a discussion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Normal(NormalMessage),
    ActionResult(ActionResultMessage),
}

impl Message {
    pub fn id(&self) -> &str {
        match self {
            Self::Normal(m) => &m.id,
            Self::ActionResult(m) => &m.id,
        }
    }

    pub fn discussion_id(&self) -> &str {
        match self {
            Self::Normal(m) => &m.discussion_id,
            Self::ActionResult(m) => &m.discussion_id,
        }
    }

    pub fn agent_id(&self) -> &str {
        match self {
            Self::Normal(m) => &m.agent_id,
            Self::ActionResult(m) => &m.agent_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Normal(m) => m.timestamp,
            Self::ActionResult(m) => m.timestamp,
        }
    }

    /// The text turn, if this is one
    pub fn as_text(&self) -> Option<&NormalMessage> {
        match self {
            Self::Normal(m) => Some(m),
            Self::ActionResult(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Normal(_))
    }

    pub fn is_action_result(&self) -> bool {
        matches!(self, Self::ActionResult(_))
    }

    /// Status of a text turn; action results have none
    pub fn status(&self) -> Option<MessageStatus> {
        self.as_text().and_then(|m| m.status)
    }

    pub fn is_from_user(&self) -> bool {
        self.agent_id() == USER_AGENT_ID
    }
}

/// A message to be created; the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub enum MessageDraft {
    Normal {
        discussion_id: String,
        agent_id: String,
        content: String,
        status: Option<MessageStatus>,
    },
    ActionResult {
        discussion_id: String,
        origin_message_id: String,
        results: Vec<ActionResult>,
    },
}

impl MessageDraft {
    /// A finished message typed by the human participant
    pub fn user(discussion_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Normal {
            discussion_id: discussion_id.into(),
            agent_id: USER_AGENT_ID.to_string(),
            content: content.into(),
            status: Some(MessageStatus::Completed),
        }
    }

    /// A finished notice authored by the engine
    pub fn system(discussion_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Normal {
            discussion_id: discussion_id.into(),
            agent_id: SYSTEM_AGENT_ID.to_string(),
            content: content.into(),
            status: Some(MessageStatus::Completed),
        }
    }

    /// An empty agent reply about to be streamed
    pub fn streaming(discussion_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self::Normal {
            discussion_id: discussion_id.into(),
            agent_id: agent_id.into(),
            content: String::new(),
            status: Some(MessageStatus::Streaming),
        }
    }

    pub fn discussion_id(&self) -> &str {
        match self {
            Self::Normal { discussion_id, .. } => discussion_id,
            Self::ActionResult { discussion_id, .. } => discussion_id,
        }
    }

    /// Materialize the draft into a message with the given id and time
    pub fn into_message(self, id: String, now: DateTime<Utc>) -> Message {
        match self {
            Self::Normal {
                discussion_id,
                agent_id,
                content,
                status,
            } => Message::Normal(NormalMessage {
                id,
                discussion_id,
                agent_id,
                content,
                timestamp: now,
                status,
                last_update_time: Some(now),
            }),
            Self::ActionResult {
                discussion_id,
                origin_message_id,
                results,
            } => Message::ActionResult(ActionResultMessage {
                id,
                discussion_id,
                agent_id: SYSTEM_AGENT_ID.to_string(),
                origin_message_id,
                results,
                timestamp: now,
            }),
        }
    }
}

/// Partial update of a text message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub status: Option<MessageStatus>,
    pub last_update_time: Option<DateTime<Utc>>,
}

impl MessagePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn status(status: MessageStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Stamp the patch with an update time
    pub fn touched(mut self, at: DateTime<Utc>) -> Self {
        self.last_update_time = Some(at);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.status.is_none() && self.last_update_time.is_none()
    }
}
