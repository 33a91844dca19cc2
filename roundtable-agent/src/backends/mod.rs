// ABOUTME: Backend implementations (echo, mock).
// ABOUTME: Each backend implements the CompletionBackend trait.

pub mod echo;
pub mod mock;
