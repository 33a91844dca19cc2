// ABOUTME: Echo backend - streams the last prompt turn back word by word.
// ABOUTME: Useful for dry runs of a discussion without a model behind it.

use crate::event::CompletionEvent;
use crate::handle::{spawn_backend, CompletionHandle};
use crate::request::CompletionRequest;
use crate::traits::CompletionBackend;
use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use std::time::Duration;

/// Backend that replies with the most recent non-system prompt message
#[derive(Debug, Clone, Default)]
pub struct EchoBackend {
    prefix: Option<String>,
    chunk_delay: Option<Duration>,
}

impl EchoBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a fixed string to every reply
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sleep between chunks to simulate a slow model
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Convert this backend into a CompletionHandle
    pub fn into_handle(self) -> CompletionHandle {
        spawn_backend(self)
    }

    /// Factory function for the registry
    ///
    /// Recognized options: `prefix` (string), `chunk_delay_ms` (integer).
    pub fn factory() -> crate::registry::BackendFactory {
        Box::new(|config| {
            let mut backend = EchoBackend::new();
            if let Some(prefix) = config.get("prefix").and_then(|v| v.as_str()) {
                backend = backend.with_prefix(prefix);
            }
            if let Some(ms) = config.get("chunk_delay_ms").and_then(|v| v.as_u64()) {
                backend = backend.with_chunk_delay(Duration::from_millis(ms));
            }
            Ok(backend.into_handle())
        })
    }

    fn reply_for(&self, request: &CompletionRequest) -> String {
        let body = request
            .last_turn()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, body),
            None => body,
        }
    }
}

impl CompletionBackend for EchoBackend {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn stream<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> BoxFuture<'a, Result<BoxStream<'a, CompletionEvent>>> {
        Box::pin(async move {
            let reply = self.reply_for(request);
            let delay = self.chunk_delay;

            let mut events: Vec<CompletionEvent> = reply
                .split_inclusive(' ')
                .map(CompletionEvent::chunk)
                .collect();
            events.push(CompletionEvent::done());

            let events = stream::iter(events).then(move |event| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                event
            });
            Ok(events.boxed())
        })
    }

    fn cancel<'a>(&'a self, _request_id: &'a str) -> BoxFuture<'a, Result<()>> {
        // Dropping the receiver is enough to stop an echo stream
        Box::pin(async { Ok(()) })
    }
}
