// ABOUTME: Named completion backend factories, listed in the order they were registered.
// ABOUTME: Options are checked to be a table before a factory sees them.

use crate::config::BackendConfig;
use crate::handle::CompletionHandle;
use anyhow::{bail, Result};
use serde_json::Value;

/// Factory function that creates a CompletionHandle from backend options
pub type BackendFactory = Box<dyn Fn(&Value) -> Result<CompletionHandle> + Send + Sync>;

/// Backends a session can be pointed at by name
pub struct BackendRegistry {
    entries: Vec<(String, BackendFactory)>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a factory; re-registering a name replaces it in its original slot
    pub fn register<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&Value) -> Result<CompletionHandle> + Send + Sync + 'static,
    {
        let factory: BackendFactory = Box::new(factory);
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => {
                tracing::debug!(backend = name, "Replacing backend factory");
                entry.1 = factory;
            }
            None => self.entries.push((name.to_string(), factory)),
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Create a backend by name; options must be a table or absent
    pub fn create(&self, name: &str, options: &Value) -> Result<CompletionHandle> {
        let Some((_, factory)) = self.entries.iter().find(|(n, _)| n == name) else {
            bail!("Unknown backend: {}", name);
        };
        if !(options.is_object() || options.is_null()) {
            bail!("Backend options for '{}' must be a table", name);
        }
        tracing::debug!(backend = name, "Creating completion backend");
        factory(options)
    }

    /// Backend names in registration order
    pub fn available(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn create_from_config(&self, config: &BackendConfig) -> Result<CompletionHandle> {
        self.create(config.backend_type(), &config.to_json_value())
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        use crate::backends::echo::EchoBackend;
        use crate::backends::mock::MockBackend;

        Self::new()
            .register("echo", EchoBackend::factory())
            .register("mock", MockBackend::factory())
    }
}
