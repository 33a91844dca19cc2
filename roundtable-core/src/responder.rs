// ABOUTME: Drives one agent reply as a streamed, cancellable completion
// ABOUTME: Persists every chunk as it arrives and finalizes the message completed or error

use crate::actions::CapabilityRegistry;
use crate::error::DiscussionError;
use crate::metrics;
use crate::prompt::{build_prompt, PromptContext};
use crate::traits::{MessageStore, ReloadHook};
use crate::types::{AgentDef, Message, MessageDraft, MessagePatch, MessageStatus};
use anyhow::Context;
use chrono::Utc;
use roundtable_agent::{CompletionEvent, CompletionHandle, CompletionRequest};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Inputs for one reply
pub struct ResponseRequest<'a> {
    pub discussion_id: &'a str,
    pub agent: &'a AgentDef,
    pub agent_id: &'a str,
    pub trigger: &'a Message,
    /// Definitions of every current member
    pub members: &'a [AgentDef],
    pub can_use_actions: bool,
    pub cancel: CancellationToken,
}

/// How the completion stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Finished,
    Cancelled,
}

pub struct StreamingResponder {
    store: Arc<dyn MessageStore>,
    completion: CompletionHandle,
    capabilities: Arc<CapabilityRegistry>,
    reload: Arc<dyn ReloadHook>,
    active: AtomicUsize,
}

impl StreamingResponder {
    pub fn new(
        store: Arc<dyn MessageStore>,
        completion: CompletionHandle,
        capabilities: Arc<CapabilityRegistry>,
        reload: Arc<dyn ReloadHook>,
    ) -> Self {
        Self {
            store,
            completion,
            capabilities,
            reload,
            active: AtomicUsize::new(0),
        }
    }

    /// Produce exactly one reply message, returned as read back from the store
    pub async fn respond(&self, req: ResponseRequest<'_>) -> Result<Message, DiscussionError> {
        let history = self
            .store
            .list_messages(req.discussion_id)
            .await
            .map_err(|e| DiscussionError::store("Failed to load discussion history", e))?;

        let descriptors = self.capabilities.descriptors();
        let prompt = build_prompt(&PromptContext {
            agent: req.agent,
            agent_id: req.agent_id,
            can_use_actions: req.can_use_actions,
            roster: req.members,
            history: &history,
            trigger: req.trigger,
            capabilities: &descriptors,
        });

        let message = self
            .store
            .create_message(MessageDraft::streaming(req.discussion_id, req.agent_id))
            .await
            .map_err(|e| DiscussionError::store("Failed to create reply message", e))?;
        let message_id = message.id().to_string();
        self.reload.reload().await;

        tracing::info!(
            discussion_id = %req.discussion_id,
            agent_id = %req.agent_id,
            message_id = %message_id,
            "Streaming reply"
        );

        let started = Instant::now();
        metrics::set_active_streams(self.active.fetch_add(1, Ordering::SeqCst) + 1);
        let outcome = self
            .stream_into(&message_id, prompt, req.agent_id, &req.cancel)
            .await;
        metrics::set_active_streams(self.active.fetch_sub(1, Ordering::SeqCst) - 1);
        metrics::record_stream_duration(started.elapsed());

        match outcome {
            Ok(end) => {
                if end == StreamEnd::Cancelled {
                    tracing::info!(
                        message_id = %message_id,
                        "Reply cancelled, keeping partial content"
                    );
                    metrics::record_stream_cancelled();
                }
                self.store
                    .update_message(
                        &message_id,
                        MessagePatch::status(MessageStatus::Completed).touched(Utc::now()),
                    )
                    .await
                    .map_err(|e| DiscussionError::store("Failed to finalize reply", e))?;
                self.reload.reload().await;
            }
            Err(e) => {
                tracing::error!(message_id = %message_id, error = %e.detail(), "Reply failed");
                if let Err(mark) = self
                    .store
                    .update_message(
                        &message_id,
                        MessagePatch::status(MessageStatus::Error).touched(Utc::now()),
                    )
                    .await
                {
                    tracing::warn!(
                        message_id = %message_id,
                        error = %mark,
                        "Failed to mark reply as errored"
                    );
                }
                self.reload.reload().await;
                return Err(e);
            }
        }

        self.store
            .get_message(&message_id)
            .await
            .and_then(|m| m.with_context(|| format!("Reply {} missing from store", message_id)))
            .map_err(|e| DiscussionError::store("Failed to read back reply", e))
    }

    async fn stream_into(
        &self,
        message_id: &str,
        prompt: Vec<roundtable_agent::PromptMessage>,
        agent_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StreamEnd, DiscussionError> {
        let request = CompletionRequest::new(prompt).with_agent(agent_id);
        let mut rx = self
            .completion
            .stream(request)
            .await
            .map_err(DiscussionError::generation)?;

        let mut content = String::new();
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if let Err(e) = self.completion.cancel(rx.request_id()).await {
                        tracing::warn!(error = %e, "Failed to cancel completion stream");
                    }
                    return Ok(StreamEnd::Cancelled);
                }
                event = rx.recv() => event,
            };

            match event {
                Some(CompletionEvent::Chunk(text)) => {
                    content.push_str(&text);
                    self.store
                        .update_message(
                            message_id,
                            MessagePatch::content(content.clone()).touched(Utc::now()),
                        )
                        .await
                        .map_err(|e| {
                            DiscussionError::store("Failed to persist streamed content", e)
                        })?;
                    metrics::record_chunk();
                    self.reload.reload().await;
                }
                Some(CompletionEvent::Done { usage }) => {
                    if let Some(usage) = usage {
                        tracing::debug!(
                            input_tokens = usage.input_tokens,
                            output_tokens = usage.output_tokens,
                            "Completion usage"
                        );
                    }
                    return Ok(StreamEnd::Finished);
                }
                Some(CompletionEvent::Error {
                    code,
                    message,
                    recoverable,
                }) => {
                    return Err(DiscussionError::generation(anyhow::anyhow!(
                        "Completion failed ({}, recoverable: {}): {}",
                        code,
                        recoverable,
                        message
                    )));
                }
                None => return Ok(StreamEnd::Finished),
            }
        }
    }
}
