// ABOUTME: Mock backend for testing - streams pre-configured replies.
// ABOUTME: Allows deterministic discussion tests without a real model behind them.
//!
//! # Example
//!
//! ```no_run
//! use roundtable_agent::backends::mock::MockBackend;
//! use roundtable_agent::{CompletionEvent, CompletionRequest, PromptMessage};
//!
//! # async fn example() {
//! let mock = MockBackend::new()
//!     .on_prompt("hello").respond_text("Hi there!")
//!     .on_prompt("plan").respond_chunks(&["First, ", "we ", "agree."]);
//!
//! let handle = mock.into_handle();
//! let request = CompletionRequest::new(vec![PromptMessage::user("hello")]);
//! let mut receiver = handle.stream(request).await.unwrap();
//!
//! if let Some(CompletionEvent::Chunk(text)) = receiver.recv().await {
//!     assert_eq!(text, "Hi there!");
//! }
//! # }
//! ```

use crate::event::{CompletionEvent, ErrorCode};
use crate::handle::{spawn_backend, CompletionHandle};
use crate::request::CompletionRequest;
use crate::traits::CompletionBackend;
use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock backend for testing
#[derive(Clone)]
pub struct MockBackend {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    cancelled: Arc<Mutex<HashSet<String>>>,
    prompts: Arc<Mutex<Vec<CompletionRequest>>>,
}

struct Expectation {
    pattern: String,
    reply: Reply,
    chunk_delay: Option<Duration>,
}

enum Reply {
    Events(Vec<CompletionEvent>),
    Refuse(String),
}

impl MockBackend {
    /// Create a new mock backend with no expectations
    pub fn new() -> Self {
        Self {
            expectations: Arc::new(Mutex::new(VecDeque::new())),
            cancelled: Arc::new(Mutex::new(HashSet::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set up an expectation for a prompt containing the given pattern
    pub fn on_prompt(self, pattern: &str) -> ExpectationBuilder {
        ExpectationBuilder {
            backend: self,
            pattern: pattern.to_string(),
            chunk_delay: None,
        }
    }

    /// Requests received so far, in arrival order
    pub fn received(&self) -> Vec<CompletionRequest> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of expectations not yet consumed
    pub fn pending(&self) -> usize {
        self.expectations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Convert this backend into a CompletionHandle
    ///
    /// The returned handle shares state with `self`, so clones kept by a test
    /// can still inspect `received()` and `pending()`.
    pub fn into_handle(self) -> CompletionHandle {
        spawn_backend(self)
    }

    /// Factory function for the registry
    ///
    /// Reads `replies = [{ pattern, chunks | text, chunk_delay_ms }]` from
    /// the backend config.
    pub fn factory() -> crate::registry::BackendFactory {
        Box::new(|config| {
            let script: MockScript = serde_json::from_value(config.clone())?;
            let mut backend = MockBackend::new();
            for reply in script.replies {
                let mut builder = backend.on_prompt(&reply.pattern);
                if let Some(ms) = reply.chunk_delay_ms {
                    builder = builder.with_chunk_delay(Duration::from_millis(ms));
                }
                backend = match (reply.chunks, reply.text) {
                    (Some(chunks), _) => {
                        let chunks: Vec<&str> = chunks.iter().map(String::as_str).collect();
                        builder.respond_chunks(&chunks)
                    }
                    (None, Some(text)) => builder.respond_text(&text),
                    (None, None) => builder.respond_text(""),
                };
            }
            Ok(backend.into_handle())
        })
    }

    /// Match expectations with FIFO preference: check the front first, fall
    /// back to searching the queue if the front doesn't match.
    fn take_expectation(&self, text: &str) -> Option<Expectation> {
        let mut exp = self.expectations.lock().unwrap_or_else(|e| e.into_inner());
        match exp.front() {
            Some(front) if text.contains(&front.pattern) => exp.pop_front(),
            Some(_) => exp
                .iter()
                .position(|e| text.contains(&e.pattern))
                .and_then(|i| exp.remove(i)),
            None => None,
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn stream<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> BoxFuture<'a, Result<BoxStream<'a, CompletionEvent>>> {
        Box::pin(async move {
            self.prompts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(request.clone());

            let text = request.prompt_text();
            let (events, delay) = match self.take_expectation(&text) {
                Some(Expectation {
                    reply: Reply::Refuse(message),
                    ..
                }) => anyhow::bail!(message),
                Some(Expectation {
                    reply: Reply::Events(events),
                    chunk_delay,
                    ..
                }) => (events, chunk_delay),
                None => {
                    let last = request
                        .last_turn()
                        .map(|m| m.content.as_str())
                        .unwrap_or_default();
                    (
                        vec![
                            CompletionEvent::chunk(format!("Mock: no expectation for '{}'", last)),
                            CompletionEvent::done(),
                        ],
                        None,
                    )
                }
            };

            let cancelled = Arc::clone(&self.cancelled);
            let request_id = request.id.clone();
            let events = stream::iter(events)
                .then(move |event| async move {
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    event
                })
                .take_while(move |_| {
                    let stop = cancelled
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .contains(&request_id);
                    futures::future::ready(!stop)
                });
            Ok(events.boxed())
        })
    }

    fn cancel<'a>(&'a self, request_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.cancelled
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(request_id.to_string());
            Ok(())
        })
    }
}

/// Builder for setting up mock expectations with a fluent API
pub struct ExpectationBuilder {
    backend: MockBackend,
    pattern: String,
    chunk_delay: Option<Duration>,
}

impl ExpectationBuilder {
    /// Sleep before each event of this reply
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    fn push(self, reply: Reply) -> MockBackend {
        self.backend
            .expectations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Expectation {
                pattern: self.pattern,
                reply,
                chunk_delay: self.chunk_delay,
            });
        self.backend
    }

    /// Respond with a list of events
    pub fn respond_with(self, events: Vec<CompletionEvent>) -> MockBackend {
        self.push(Reply::Events(events))
    }

    /// Respond with a single chunk followed by completion
    pub fn respond_text(self, text: &str) -> MockBackend {
        self.respond_chunks(&[text])
    }

    /// Respond with each chunk in order followed by completion
    pub fn respond_chunks(self, chunks: &[&str]) -> MockBackend {
        let mut events: Vec<CompletionEvent> =
            chunks.iter().map(|c| CompletionEvent::chunk(*c)).collect();
        events.push(CompletionEvent::done());
        self.respond_with(events)
    }

    /// Stream some chunks, then fail mid-reply
    pub fn respond_partial_then_error(
        self,
        chunks: &[&str],
        code: ErrorCode,
        message: &str,
    ) -> MockBackend {
        let mut events: Vec<CompletionEvent> =
            chunks.iter().map(|c| CompletionEvent::chunk(*c)).collect();
        events.push(CompletionEvent::Error {
            code,
            message: message.to_string(),
            recoverable: false,
        });
        self.respond_with(events)
    }

    /// Respond with an error event
    pub fn respond_error(self, code: ErrorCode, message: &str) -> MockBackend {
        self.respond_partial_then_error(&[], code, message)
    }

    /// Refuse to start the stream at all
    pub fn refuse(self, message: &str) -> MockBackend {
        self.push(Reply::Refuse(message.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct MockScript {
    #[serde(default)]
    replies: Vec<MockReply>,
}

#[derive(Debug, Deserialize)]
struct MockReply {
    pattern: String,
    #[serde(default)]
    chunks: Option<Vec<String>>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    chunk_delay_ms: Option<u64>,
}
