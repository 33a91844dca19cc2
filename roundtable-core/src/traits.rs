// ABOUTME: Collaborator traits the discussion core is driven through
// ABOUTME: Message persistence, agent lookup and the post-write reload hook

use crate::types::{AgentDef, Message, MessageDraft, MessagePatch};
use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;

// =============================================================================
// Message Store
// =============================================================================

/// Persistence for discussion messages
///
/// The store assigns ids and timestamps. `list_messages` returns messages in
/// chronological order.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_message(&self, draft: MessageDraft) -> Result<Message>;

    /// Apply `patch` and return the updated message
    async fn update_message(&self, id: &str, patch: MessagePatch) -> Result<Message>;

    async fn get_message(&self, id: &str) -> Result<Option<Message>>;

    async fn list_messages(&self, discussion_id: &str) -> Result<Vec<Message>>;
}

// =============================================================================
// Agent Directory
// =============================================================================

/// Read-only list of known agents
pub trait AgentDirectory: Send + Sync {
    fn agents(&self) -> Vec<AgentDef>;

    fn get(&self, agent_id: &str) -> Option<AgentDef> {
        self.agents().into_iter().find(|a| a.id == agent_id)
    }
}

// =============================================================================
// Reload Hook
// =============================================================================

/// Notification fired after every persisted write so views can refresh
#[async_trait]
pub trait ReloadHook: Send + Sync {
    async fn reload(&self);
}

/// Reload hook that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReload;

#[async_trait]
impl ReloadHook for NoopReload {
    async fn reload(&self) {}
}

type ReloadFn = dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync;

/// Reload hook backed by a closure
pub struct FnReload {
    f: Box<ReloadFn>,
}

impl FnReload {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            f: Box::new(move || Box::pin(f())),
        }
    }
}

#[async_trait]
impl ReloadHook for FnReload {
    async fn reload(&self) {
        (self.f)().await
    }
}
