// ABOUTME: Events broadcast by the discussion control and its state snapshot
// ABOUTME: Subscribers receive discussion switches, turn progress, limits and errors

use crate::error::{ErrorKind, ErrorPolicy};
use serde::{Deserialize, Serialize};

/// Run state of the discussion loop
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Paused,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Point-in-time view of the control for UI consumers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSnapshot {
    pub discussion_id: Option<String>,
    pub state: RunState,
    pub is_running: bool,
    pub current_speaker_id: Option<String>,
    pub processed: usize,
    pub round_limit: usize,
}

/// Error payload delivered to subscribers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    pub policy: ErrorPolicy,
}

/// Notifications from the discussion control
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscussionEvent {
    /// The current discussion was switched or cleared
    DiscussionChanged { discussion_id: Option<String> },
    /// Run state, speaker or progress changed
    Snapshot(RunSnapshot),
    SpeakerStarted { agent_id: String },
    TurnCompleted {
        agent_id: String,
        message_id: String,
        processed: usize,
    },
    /// The run reached its turn limit and paused
    RoundLimitReached { limit: usize },
    Error(ErrorReport),
}

impl DiscussionEvent {
    pub fn as_snapshot(&self) -> Option<&RunSnapshot> {
        match self {
            Self::Snapshot(s) => Some(s),
            _ => None,
        }
    }
}
