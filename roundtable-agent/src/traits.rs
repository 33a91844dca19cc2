// ABOUTME: Core CompletionBackend trait that all backends implement.
// ABOUTME: Defines streamed reply generation and cooperative cancellation.

use crate::{CompletionEvent, CompletionRequest};
use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

/// Core trait that all completion backends implement.
///
/// Backends are driven by a worker task (see [`crate::spawn_backend`]) so
/// callers only ever hold a cheap, cloneable [`crate::CompletionHandle`].
pub trait CompletionBackend {
    /// Backend name for logging and metrics
    fn name(&self) -> &'static str;

    /// Start generating a reply and return a stream of events
    ///
    /// The stream emits `Chunk` events as text is produced and ends with a
    /// `Done` or `Error` event. A stream that ends without a terminal event is
    /// treated as done by consumers.
    fn stream<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> BoxFuture<'a, Result<BoxStream<'a, CompletionEvent>>>;

    /// Cancel an in-progress reply
    fn cancel<'a>(&'a self, request_id: &'a str) -> BoxFuture<'a, Result<()>>;
}
