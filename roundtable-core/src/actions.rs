// ABOUTME: Parsing of <action> directives embedded in replies and the capability registry
// ABOUTME: Capabilities are async tools; the registry executes parsed actions in order

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

static ACTION_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<action>(.*?)</action>").expect("action block regex is valid")
});

/// One capability invocation requested by an agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedAction {
    pub capability: String,
    #[serde(default)]
    pub params: Value,
    #[serde(
        default,
        rename = "operationId",
        alias = "operation_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ActionBlock {
    Many(Vec<ParsedAction>),
    One(ParsedAction),
}

/// Extract every action directive from `content`, skipping malformed blocks
pub fn parse_actions(content: &str) -> Vec<ParsedAction> {
    let mut actions = Vec::new();
    for captures in ACTION_BLOCK.captures_iter(content) {
        let body = captures.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        match serde_json::from_str::<ActionBlock>(body) {
            Ok(ActionBlock::One(action)) => actions.push(action),
            Ok(ActionBlock::Many(many)) => actions.extend(many),
            Err(e) => {
                tracing::warn!(error = %e, block = %body, "Skipping malformed action block");
            }
        }
    }
    actions.retain(|a| !a.capability.trim().is_empty());
    actions
}

/// Remove action blocks from `content`, leaving the prose
pub fn strip_actions(content: &str) -> String {
    ACTION_BLOCK.replace_all(content, "").trim().to_string()
}

/// A side-effecting operation agents may invoke from their replies
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the accepted params
    fn schema(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    async fn execute(&self, params: Value) -> Result<Value>;
}

/// Catalog entry shown to agents in their prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

/// Outcome of executing one parsed action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionExecution {
    pub capability: String,
    pub params: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ActionExecution {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Registry of capabilities keyed by name
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability, replacing any with the same name
    pub fn register(mut self, capability: impl Capability + 'static) -> Self {
        self.insert(Arc::new(capability));
        self
    }

    pub fn insert(&mut self, capability: Arc<dyn Capability>) {
        self.capabilities
            .insert(capability.name().to_string(), capability);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Sorted catalog for prompts
    pub fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        self.capabilities
            .values()
            .map(|c| CapabilityDescriptor {
                name: c.name().to_string(),
                description: c.description().to_string(),
                schema: c.schema(),
            })
            .collect()
    }

    /// Execute actions one after another; failures become error outcomes
    pub async fn execute(&self, actions: &[ParsedAction]) -> Vec<ActionExecution> {
        let mut outcomes = Vec::with_capacity(actions.len());
        for action in actions {
            let start_time = Utc::now();
            let outcome = match self.get(&action.capability) {
                Some(capability) => capability.execute(action.params.clone()).await,
                None => Err(anyhow::anyhow!("Unknown capability: {}", action.capability)),
            };
            let end_time = Utc::now();

            let (result, error) = match outcome {
                Ok(value) => (Some(value), None),
                Err(e) => {
                    tracing::warn!(
                        capability = %action.capability,
                        error = %e,
                        "Action failed"
                    );
                    (None, Some(format!("{:#}", e)))
                }
            };
            crate::metrics::record_action(&action.capability, error.is_none());

            outcomes.push(ActionExecution {
                capability: action.capability.clone(),
                params: action.params.clone(),
                result,
                error,
                start_time,
                end_time,
            });
        }
        outcomes
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.capabilities.keys().collect::<Vec<_>>())
            .finish()
    }
}
