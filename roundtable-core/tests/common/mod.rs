// ABOUTME: Shared fixtures for roundtable-core integration tests
// ABOUTME: Builds a discussion control over the in-memory store and the mock backend

#![allow(dead_code)]

use async_trait::async_trait;
use roundtable_agent::backends::mock::MockBackend;
use roundtable_core::traits::FnReload;
use roundtable_core::{
    AgentDef, AgentRole, Capability, CapabilityRegistry, DiscussionControl, DiscussionEvent,
    InMemoryMessageStore, Member, Message, MessageDraft, MessageStore, Settings,
    StaticAgentDirectory,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

pub const DISCUSSION: &str = "d1";

pub struct Harness {
    pub store: Arc<InMemoryMessageStore>,
    pub control: Arc<DiscussionControl>,
    pub mock: MockBackend,
    pub reloads: Arc<AtomicUsize>,
    pub events: broadcast::Receiver<DiscussionEvent>,
}

pub fn moderator() -> AgentDef {
    AgentDef::new("mod", "Mia", "mia", AgentRole::Moderator)
}

pub fn expert_a() -> AgentDef {
    AgentDef::new("ea", "Expert A", "expertA", AgentRole::Participant)
}

pub fn expert_b() -> AgentDef {
    AgentDef::new("eb", "Expert B", "expertB", AgentRole::Participant)
}

/// Capability that echoes its params back
pub struct Lookup;

#[async_trait]
impl Capability for Lookup {
    fn name(&self) -> &str {
        "lookup"
    }

    fn description(&self) -> &str {
        "Look up a term"
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        Ok(json!({ "found": params.get("term").cloned().unwrap_or(Value::Null) }))
    }
}

pub fn harness(
    agents: Vec<AgentDef>,
    members: Vec<Member>,
    settings: Settings,
    mock: MockBackend,
) -> Harness {
    let store = Arc::new(InMemoryMessageStore::new());
    let reloads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reloads);
    let reload = Arc::new(FnReload::new(move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }));

    let control = Arc::new(DiscussionControl::new(
        store.clone(),
        Arc::new(StaticAgentDirectory::new(agents)),
        mock.clone().into_handle(),
        CapabilityRegistry::new().register(Lookup),
        reload,
    ));
    let events = control.subscribe();
    control.set_members(members);
    control.set_settings(settings);
    control.set_current_discussion_id(Some(DISCUSSION.to_string()));

    Harness {
        store,
        control,
        mock,
        reloads,
        events,
    }
}

impl Harness {
    pub async fn say(&self, text: &str) -> Message {
        self.store
            .create_message(MessageDraft::user(DISCUSSION, text))
            .await
            .unwrap()
    }

    pub async fn transcript(&self) -> Vec<Message> {
        self.store.list_messages(DISCUSSION).await.unwrap()
    }

    /// Author ids of every message after the first `skip`
    pub async fn speakers(&self, skip: usize) -> Vec<String> {
        self.transcript()
            .await
            .iter()
            .skip(skip)
            .map(|m| m.agent_id().to_string())
            .collect()
    }

    pub fn drain_events(&mut self) -> Vec<DiscussionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
