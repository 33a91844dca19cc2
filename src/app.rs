// ABOUTME: A discussion session for the command line: backend, store, control and rendering
// ABOUTME: Feeds user messages through the turn loop and logs control events as they happen

use anyhow::{Context, Result};
use roundtable_agent::BackendRegistry;
use roundtable_core::prompt::describe_action_result;
use roundtable_core::{
    AgentDef, CapabilityRegistry, DiscussionConfig, DiscussionControl,
    DiscussionError, DiscussionEvent, InMemoryMessageStore, Message, MessageDraft, MessageStatus,
    MessageStore, NoopReload, StaticAgentDirectory, SYSTEM_AGENT_ID, USER_AGENT_ID,
};
use std::fmt::Write;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Result of feeding one user message
#[derive(Debug)]
pub struct SayOutcome {
    /// Messages created by this call, starting with the user's own
    pub messages: Vec<Message>,
    /// Set when the turn loop failed and the discussion paused
    pub error: Option<DiscussionError>,
}

/// One loaded discussion
pub struct Session {
    config: DiscussionConfig,
    store: Arc<InMemoryMessageStore>,
    control: Arc<DiscussionControl>,
}

/// Backends the command line tool knows about
pub fn default_backends() -> BackendRegistry {
    BackendRegistry::default()
}

impl Session {
    /// Build a session; must be called inside a tokio runtime
    pub fn new(config: DiscussionConfig, capabilities: CapabilityRegistry) -> Result<Self> {
        Self::with_backends(config, capabilities, &default_backends())
    }

    pub fn with_backends(
        config: DiscussionConfig,
        capabilities: CapabilityRegistry,
        backends: &BackendRegistry,
    ) -> Result<Self> {
        let completion = backends
            .create_from_config(&config.backend)
            .with_context(|| {
                format!(
                    "Failed to create '{}' backend (available: {})",
                    config.backend.backend_type(),
                    backends.available().join(", ")
                )
            })?;

        let store = Arc::new(InMemoryMessageStore::new());
        let control = Arc::new(DiscussionControl::new(
            store.clone(),
            Arc::new(StaticAgentDirectory::new(config.agents.clone())),
            completion,
            capabilities,
            Arc::new(NoopReload),
        ));
        control.set_members(config.members.clone());
        control.set_settings(config.settings.clone());
        control.set_current_discussion_id(Some(config.id.clone()));

        tracing::info!(
            discussion_id = %config.id,
            agents = config.agents.len(),
            members = config.members.len(),
            round_limit = config.settings.round_limit(),
            backend = %config.backend.backend_type(),
            "Discussion ready"
        );

        Ok(Self {
            config,
            store,
            control,
        })
    }

    pub fn config(&self) -> &DiscussionConfig {
        &self.config
    }

    pub fn control(&self) -> &Arc<DiscussionControl> {
        &self.control
    }

    /// Post a user message and run turns until the loop settles
    pub async fn say(&self, text: &str) -> Result<SayOutcome> {
        let before = self.transcript().await?.len();
        let trigger = self
            .store
            .create_message(MessageDraft::user(&self.config.id, text))
            .await
            .context("Failed to post user message")?;

        let error = self.control.process(trigger).await.err();
        let messages = self.transcript().await?.split_off(before);
        Ok(SayOutcome { messages, error })
    }

    pub async fn transcript(&self) -> Result<Vec<Message>> {
        self.store.list_messages(&self.config.id).await
    }

    /// Log control events until the control is dropped
    pub fn spawn_event_logger(&self) -> JoinHandle<()> {
        let mut events = self.control.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event logger fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

fn log_event(event: &DiscussionEvent) {
    match event {
        DiscussionEvent::DiscussionChanged { discussion_id } => {
            tracing::debug!(discussion_id = ?discussion_id, "Discussion changed");
        }
        DiscussionEvent::Snapshot(snapshot) => {
            tracing::trace!(
                state = %snapshot.state,
                speaker = ?snapshot.current_speaker_id,
                processed = snapshot.processed,
                round_limit = snapshot.round_limit,
                "Snapshot"
            );
        }
        DiscussionEvent::SpeakerStarted { agent_id } => {
            tracing::info!(agent_id = %agent_id, "Speaking");
        }
        DiscussionEvent::TurnCompleted {
            agent_id,
            processed,
            ..
        } => {
            tracing::info!(agent_id = %agent_id, processed, "Turn done");
        }
        DiscussionEvent::RoundLimitReached { limit } => {
            tracing::warn!(limit, "Round limit reached");
        }
        DiscussionEvent::Error(report) => {
            tracing::error!(kind = %report.kind, policy = ?report.policy, "{}", report.message);
        }
    }
}

fn display_name(agent_id: &str, agents: &[AgentDef]) -> String {
    match agent_id {
        USER_AGENT_ID => "You".to_string(),
        SYSTEM_AGENT_ID => "System".to_string(),
        other => agents
            .iter()
            .find(|a| a.id == other)
            .map(|a| a.name.clone())
            .unwrap_or_else(|| other.to_string()),
    }
}

/// Plain-text form of one message
pub fn render_message(message: &Message, agents: &[AgentDef]) -> String {
    let name = display_name(message.agent_id(), agents);
    match message {
        Message::Normal(m) => {
            let marker = match m.status {
                Some(MessageStatus::Streaming) => " (streaming)",
                Some(MessageStatus::Error) => " (failed)",
                _ => "",
            };
            format!("[{}]{} {}", name, marker, m.content)
        }
        Message::ActionResult(r) => {
            let mut out = format!("[{}] action results:", name);
            for result in &r.results {
                let _ = write!(out, "\n  - {}", describe_action_result(result));
            }
            out
        }
    }
}

pub fn render_transcript(messages: &[Message], agents: &[AgentDef]) -> String {
    messages
        .iter()
        .map(|m| render_message(m, agents))
        .collect::<Vec<_>>()
        .join("\n")
}
