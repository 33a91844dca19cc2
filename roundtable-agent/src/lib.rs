// ABOUTME: Streaming completion backend abstraction for roundtable.
// ABOUTME: Provides trait-based backends (echo, mock) behind Send+Sync handles.

pub mod config;
pub mod event;
pub mod handle;
pub mod registry;
pub mod request;
pub mod traits;

pub mod backends;

pub use event::{CompletionEvent, ErrorCode, Usage};
pub use handle::{spawn_backend, ChunkReceiver, CompletionHandle};
pub use registry::{BackendFactory, BackendRegistry};
pub use request::{CompletionRequest, PromptMessage, PromptRole};
pub use traits::CompletionBackend;
