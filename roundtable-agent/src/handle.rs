// ABOUTME: CompletionHandle provides a Send+Sync wrapper around completion backends.
// ABOUTME: Uses channels to communicate with a backend worker task.

use crate::{CompletionBackend, CompletionEvent, CompletionRequest};
use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Buffered events per stream before the backend is back-pressured
const EVENT_BUFFER: usize = 2048;

/// Commands sent from CompletionHandle to the backend worker
#[derive(Debug)]
pub enum Command {
    Stream {
        request: CompletionRequest,
        event_tx: mpsc::Sender<CompletionEvent>,
        reply: oneshot::Sender<Result<()>>,
    },
    Cancel {
        request_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Send + Sync handle the discussion core talks to.
///
/// Internally communicates with a worker task that drives the actual
/// backend, so a single backend can serve streams for many agents and still
/// accept cancellation while a stream is in flight.
#[derive(Clone)]
pub struct CompletionHandle {
    tx: mpsc::Sender<Command>,
    name: &'static str,
}

impl CompletionHandle {
    /// Create a new handle with the given command channel and backend name
    pub fn new(tx: mpsc::Sender<Command>, name: &'static str) -> Self {
        Self { tx, name }
    }

    /// Get the backend name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Start streaming a reply and receive events via ChunkReceiver
    pub async fn stream(&self, request: CompletionRequest) -> Result<ChunkReceiver> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (reply_tx, reply_rx) = oneshot::channel();
        let request_id = request.id.clone();

        self.tx
            .send(Command::Stream {
                request,
                event_tx,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Backend worker closed"))?;

        // Wait for the backend to acknowledge the stream started
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("Backend worker dropped reply channel"))??;

        Ok(ChunkReceiver::new(event_rx, request_id))
    }

    /// Cancel an in-progress stream
    pub async fn cancel(&self, request_id: &str) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Cancel {
                request_id: request_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Backend worker closed"))?;
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("Backend worker dropped reply channel"))?
    }
}

/// Spawn a worker task that drives `backend` and return a handle to it.
///
/// Each stream runs in its own task so `Cancel` commands are served while
/// chunks are still flowing. A stream stops early when its receiver is
/// dropped.
pub fn spawn_backend<B>(backend: B) -> CompletionHandle
where
    B: CompletionBackend + Send + Sync + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Command>(32);
    let name = backend.name();
    let backend = Arc::new(backend);

    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Stream {
                    request,
                    event_tx,
                    reply,
                } => {
                    let backend = Arc::clone(&backend);
                    tokio::spawn(async move {
                        let mut events = match backend.stream(&request).await {
                            Ok(events) => {
                                let _ = reply.send(Ok(()));
                                events
                            }
                            Err(e) => {
                                tracing::warn!(backend = name, request_id = %request.id, error = %e, "Backend refused stream");
                                let _ = reply.send(Err(e));
                                return;
                            }
                        };

                        while let Some(event) = events.next().await {
                            if event_tx.send(event).await.is_err() {
                                tracing::debug!(backend = name, request_id = %request.id, "Receiver dropped, stopping stream");
                                break;
                            }
                        }
                    });
                }
                Command::Cancel { request_id, reply } => {
                    let _ = reply.send(backend.cancel(&request_id).await);
                }
            }
        }
        tracing::debug!(backend = name, "Backend worker shutting down");
    });

    CompletionHandle::new(tx, name)
}

/// Receiver for streaming events from one reply.
///
/// This is `Send` so it can be passed across async task boundaries.
pub struct ChunkReceiver {
    rx: mpsc::Receiver<CompletionEvent>,
    request_id: String,
}

impl ChunkReceiver {
    /// Create a new ChunkReceiver wrapping the given channel
    pub fn new(rx: mpsc::Receiver<CompletionEvent>, request_id: impl Into<String>) -> Self {
        Self {
            rx,
            request_id: request_id.into(),
        }
    }

    /// Id of the request this receiver is streaming
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Receive the next event, or None if the stream is closed
    pub async fn recv(&mut self) -> Option<CompletionEvent> {
        self.rx.recv().await
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<CompletionEvent> {
        self.rx.try_recv().ok()
    }
}
