// ABOUTME: Discussion orchestration core for multi-agent conversations
// ABOUTME: Turn scheduling, mention routing, streamed replies and embedded action execution

pub mod action_runner;
pub mod actions;
pub mod config;
pub mod error;
pub mod events;
pub mod mention;
pub mod metrics;
pub mod orchestrator;
pub mod prompt;
pub mod responder;
pub mod selector;
pub mod store;
pub mod traits;
pub mod types;

pub use action_runner::ActionRunner;
pub use actions::{
    parse_actions, ActionExecution, Capability, CapabilityDescriptor, CapabilityRegistry,
    ParsedAction,
};
pub use config::DiscussionConfig;
pub use error::{DiscussionError, ErrorKind, ErrorPolicy};
pub use events::{DiscussionEvent, ErrorReport, RunSnapshot, RunState};
pub use mention::MentionResolver;
pub use orchestrator::DiscussionControl;
pub use responder::{ResponseRequest, StreamingResponder};
pub use selector::SpeakerSelector;
pub use store::{InMemoryMessageStore, StaticAgentDirectory};
pub use traits::{AgentDirectory, FnReload, MessageStore, NoopReload, ReloadHook};
pub use types::{
    ActionResult, ActionResultMessage, ActionStatus, AgentDef, AgentRole, Member, Message,
    MessageDraft, MessagePatch, MessageStatus, NormalMessage, Settings, SYSTEM_AGENT_ID,
    USER_AGENT_ID,
};

// Re-export the completion abstraction the core is driven by
pub use roundtable_agent::{CompletionHandle, CompletionRequest, PromptMessage};
