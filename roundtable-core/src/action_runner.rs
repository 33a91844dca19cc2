// ABOUTME: Executes capability invocations embedded in a finished agent reply
// ABOUTME: Records the outcomes as a system-authored action result message

use crate::actions::{parse_actions, CapabilityRegistry};
use crate::error::DiscussionError;
use crate::traits::{MessageStore, ReloadHook};
use crate::types::{
    ActionResult, ActionStatus, Message, MessageDraft, SYSTEM_AGENT_ID, USER_AGENT_ID,
};
use std::sync::Arc;

pub struct ActionRunner {
    store: Arc<dyn MessageStore>,
    capabilities: Arc<CapabilityRegistry>,
    reload: Arc<dyn ReloadHook>,
}

impl ActionRunner {
    pub fn new(
        store: Arc<dyn MessageStore>,
        capabilities: Arc<CapabilityRegistry>,
        reload: Arc<dyn ReloadHook>,
    ) -> Self {
        Self {
            store,
            capabilities,
            reload,
        }
    }

    /// Run the actions in `reply`; `None` when there was nothing to run
    pub async fn run(
        &self,
        reply: &Message,
        can_use_actions: bool,
    ) -> Result<Option<Message>, DiscussionError> {
        let Some(text) = reply.as_text() else {
            return Ok(None);
        };
        let author = text.agent_id.as_str();
        if author.is_empty() || author == USER_AGENT_ID || author == SYSTEM_AGENT_ID {
            return Ok(None);
        }
        if !can_use_actions {
            tracing::debug!(agent_id = %author, "Agent may not use actions, skipping");
            return Ok(None);
        }

        let actions = parse_actions(&text.content);
        if actions.is_empty() {
            return Ok(None);
        }

        tracing::info!(
            agent_id = %author,
            message_id = %text.id,
            count = actions.len(),
            "Executing actions"
        );
        let outcomes = self.capabilities.execute(&actions).await;

        let results: Vec<ActionResult> = actions
            .iter()
            .zip(outcomes)
            .enumerate()
            .map(|(index, (action, outcome))| ActionResult {
                operation_id: action
                    .operation_id
                    .clone()
                    .unwrap_or_else(|| format!("op-{}", index)),
                description: action
                    .description
                    .clone()
                    .unwrap_or_else(|| action.capability.clone()),
                status: if outcome.error.is_some() {
                    ActionStatus::Error
                } else {
                    ActionStatus::Success
                },
                capability: outcome.capability,
                params: outcome.params,
                result: outcome.result,
                error: outcome.error,
                start_time: outcome.start_time,
                end_time: outcome.end_time,
            })
            .collect();

        let message = self
            .store
            .create_message(MessageDraft::ActionResult {
                discussion_id: text.discussion_id.clone(),
                origin_message_id: text.id.clone(),
                results,
            })
            .await
            .map_err(|e| DiscussionError::action(e.context("Failed to record action results")))?;
        self.reload.reload().await;

        Ok(Some(message))
    }
}
