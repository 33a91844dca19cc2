// ABOUTME: In-memory implementations of the message store and agent directory
// ABOUTME: Used by the CLI and tests; supports injected write failures for error-path coverage

use crate::traits::{AgentDirectory, MessageStore};
use crate::types::{AgentDef, Message, MessageDraft, MessagePatch};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock as StdRwLock;
use tokio::sync::RwLock;

/// Message store held entirely in memory
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<Message>>,
    /// Number of content updates that succeed before updates start failing
    fail_updates_after: StdRwLock<Option<usize>>,
    content_updates: AtomicUsize,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make content updates fail once `n` of them have succeeded
    pub fn fail_content_updates_after(&self, n: usize) {
        *self
            .fail_updates_after
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(n);
    }

    /// Snapshot of every stored message across discussions
    pub async fn all(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create_message(&self, draft: MessageDraft) -> Result<Message> {
        let message = draft.into_message(uuid::Uuid::new_v4().to_string(), Utc::now());
        self.messages.write().await.push(message.clone());
        tracing::trace!(message_id = %message.id(), "Message created");
        Ok(message)
    }

    async fn update_message(&self, id: &str, patch: MessagePatch) -> Result<Message> {
        if patch.content.is_some() {
            let limit = *self
                .fail_updates_after
                .read()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(limit) = limit {
                if self.content_updates.load(Ordering::SeqCst) >= limit {
                    bail!("Injected write failure for message {}", id);
                }
            }
        }

        let mut messages = self.messages.write().await;
        let Some(message) = messages.iter_mut().find(|m| m.id() == id) else {
            bail!("Message not found: {}", id);
        };

        match &mut *message {
            Message::Normal(m) => {
                if let Some(content) = patch.content {
                    m.content = content;
                    self.content_updates.fetch_add(1, Ordering::SeqCst);
                }
                if let Some(status) = patch.status {
                    m.status = Some(status);
                }
                if let Some(at) = patch.last_update_time {
                    m.last_update_time = Some(at);
                }
            }
            Message::ActionResult(_) => {
                if patch.content.is_some() || patch.status.is_some() {
                    bail!("Action result message {} cannot be patched", id);
                }
            }
        }
        Ok(message.clone())
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let messages = self.messages.read().await;
        Ok(messages.iter().find(|m| m.id() == id).cloned())
    }

    async fn list_messages(&self, discussion_id: &str) -> Result<Vec<Message>> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|m| m.discussion_id() == discussion_id)
            .cloned()
            .collect())
    }
}

/// Agent directory over a fixed, replaceable list
#[derive(Default)]
pub struct StaticAgentDirectory {
    agents: StdRwLock<Vec<AgentDef>>,
}

impl StaticAgentDirectory {
    pub fn new(agents: Vec<AgentDef>) -> Self {
        Self {
            agents: StdRwLock::new(agents),
        }
    }

    pub fn set_agents(&self, agents: Vec<AgentDef>) {
        *self.agents.write().unwrap_or_else(|e| e.into_inner()) = agents;
    }
}

impl AgentDirectory for StaticAgentDirectory {
    fn agents(&self) -> Vec<AgentDef> {
        self.agents.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
