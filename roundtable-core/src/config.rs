// ABOUTME: Discussion file parsing from TOML with environment variable overrides
// ABOUTME: Describes agents, members, settings and the completion backend for one discussion

use crate::types::{AgentDef, Member, Settings};
use anyhow::{Context, Result};
use roundtable_agent::config::BackendConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A discussion definition loaded from disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionConfig {
    #[serde(default = "default_discussion_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub agents: Vec<AgentDef>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub backend: BackendConfig,
}

fn default_discussion_id() -> String {
    "default".to_string()
}

impl DiscussionConfig {
    /// Parse a discussion from a TOML string without overrides or validation
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse discussion TOML")
    }

    /// Read, override from the environment, and validate a discussion file
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "Loading discussion");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read discussion file: {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply ROUNDTABLE_MAX_ROUNDS and ROUNDTABLE_BACKEND
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("ROUNDTABLE_MAX_ROUNDS") {
            self.settings.max_rounds = val.trim().parse().with_context(|| {
                format!("ROUNDTABLE_MAX_ROUNDS must be a number, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("ROUNDTABLE_BACKEND") {
            self.backend.backend_type = val;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            anyhow::bail!("Discussion id must not be empty");
        }

        let mut ids = HashSet::new();
        let mut slugs = HashSet::new();
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                anyhow::bail!("Agent '{}' has an empty id", agent.name);
            }
            if !ids.insert(agent.id.as_str()) {
                anyhow::bail!("Duplicate agent id: {}", agent.id);
            }
            if agent.slug.is_empty() || agent.slug.chars().any(char::is_whitespace) {
                anyhow::bail!(
                    "Agent '{}' needs a slug without whitespace, got: '{}'",
                    agent.id,
                    agent.slug
                );
            }
            if !slugs.insert(agent.slug.to_lowercase()) {
                anyhow::bail!("Duplicate agent slug: {}", agent.slug);
            }
        }

        let mut seen = HashSet::new();
        for member in &self.members {
            if !ids.contains(member.agent_id.as_str()) {
                anyhow::bail!("Member references unknown agent: {}", member.agent_id);
            }
            if !seen.insert(member.agent_id.as_str()) {
                anyhow::bail!("Agent {} is listed as a member twice", member.agent_id);
            }
        }

        Ok(())
    }
}
