// ABOUTME: Builds the prompt for one agent turn from traits, roster, history and capabilities
// ABOUTME: Other speakers are attributed by name; action results are rendered as tool output

use crate::actions::CapabilityDescriptor;
use crate::types::{
    ActionResult, ActionResultMessage, ActionStatus, AgentDef, Message, MessageStatus, SYSTEM_AGENT_ID,
    USER_AGENT_ID,
};
use roundtable_agent::PromptMessage;
use std::fmt::Write;

/// Everything needed to prompt one agent for one turn
pub struct PromptContext<'a> {
    pub agent: &'a AgentDef,
    pub agent_id: &'a str,
    pub can_use_actions: bool,
    pub roster: &'a [AgentDef],
    pub history: &'a [Message],
    pub trigger: &'a Message,
    pub capabilities: &'a [CapabilityDescriptor],
}

pub fn build_prompt(ctx: &PromptContext<'_>) -> Vec<PromptMessage> {
    let mut messages = vec![PromptMessage::system(system_prompt(ctx))];

    // A text trigger always goes last; action results stay in place
    let trigger_is_text = ctx.trigger.is_text();
    messages.extend(
        ctx.history
            .iter()
            .filter(|m| !(trigger_is_text && m.id() == ctx.trigger.id()))
            .filter_map(|m| render(m, ctx)),
    );
    if trigger_is_text {
        messages.extend(render(ctx.trigger, ctx));
    }

    messages
}

fn system_prompt(ctx: &PromptContext<'_>) -> String {
    let agent = ctx.agent;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "You are {} (@{}), the {} of this discussion.",
        agent.name, agent.slug, agent.role
    );
    if let Some(personality) = &agent.personality {
        let _ = writeln!(out, "Personality: {}", personality);
    }
    if !agent.expertise.is_empty() {
        let _ = writeln!(out, "Expertise: {}", agent.expertise.join(", "));
    }
    if let Some(bias) = &agent.bias {
        let _ = writeln!(out, "Perspective: {}", bias);
    }
    if let Some(style) = &agent.response_style {
        let _ = writeln!(out, "Response style: {}", style);
    }

    let others: Vec<&AgentDef> = ctx
        .roster
        .iter()
        .filter(|a| a.id != ctx.agent_id)
        .collect();
    if !others.is_empty() {
        out.push_str("\nOther participants:\n");
        for other in others {
            let _ = writeln!(out, "- {} (@{}, {})", other.name, other.slug, other.role);
        }
        out.push_str("Mention a participant with @slug to hand them the next turn.\n");
    }

    if ctx.can_use_actions && !ctx.capabilities.is_empty() {
        out.push_str("\nAvailable capabilities:\n");
        for capability in ctx.capabilities {
            let _ = writeln!(
                out,
                "- {}: {} (params schema: {})",
                capability.name, capability.description, capability.schema
            );
        }
        out.push_str(
            "To invoke one, include <action>{\"capability\": \"name\", \"params\": {...}, \"description\": \"why\"}</action> in your reply. \
             A JSON array runs several in order. Results arrive in the next message.\n",
        );
    }

    if let Some(instructions) = &agent.instructions {
        let _ = writeln!(out, "\n{}", instructions);
    }

    out.trim_end().to_string()
}

fn render(message: &Message, ctx: &PromptContext<'_>) -> Option<PromptMessage> {
    match message {
        Message::Normal(m) => {
            if m.status == Some(MessageStatus::Error) || m.content.trim().is_empty() {
                return None;
            }
            if m.agent_id == ctx.agent_id {
                return Some(PromptMessage::assistant(&m.content));
            }
            match m.agent_id.as_str() {
                SYSTEM_AGENT_ID => Some(PromptMessage::system(&m.content)),
                USER_AGENT_ID => Some(PromptMessage::user(&m.content).named(USER_AGENT_ID)),
                other => {
                    let (name, slug) = ctx
                        .roster
                        .iter()
                        .find(|a| a.id == other)
                        .map(|a| (a.name.as_str(), a.slug.as_str()))
                        .unwrap_or((other, other));
                    Some(PromptMessage::user(format!("[{}]: {}", name, m.content)).named(slug))
                }
            }
        }
        Message::ActionResult(r) => {
            Some(PromptMessage::user(render_action_results(r)).named(SYSTEM_AGENT_ID))
        }
    }
}

/// Text form of an action result report
pub fn render_action_results(report: &ActionResultMessage) -> String {
    let mut out = String::from("[Action results]");
    for result in &report.results {
        let _ = write!(out, "\n- {}", describe_action_result(result));
    }
    out
}

/// One result as `op capability (description): outcome`
pub fn describe_action_result(result: &ActionResult) -> String {
    let outcome = match result.status {
        ActionStatus::Success => result
            .result
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "ok".to_string()),
        ActionStatus::Error => format!(
            "error: {}",
            result.error.as_deref().unwrap_or("unknown error")
        ),
    };
    format!(
        "{} {} ({}): {}",
        result.operation_id, result.capability, result.description, outcome
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentRole, MessageDraft};
    use chrono::Utc;
    use roundtable_agent::PromptRole;
    use serde_json::json;

    fn roster() -> Vec<AgentDef> {
        let mut moderator = AgentDef::new("mod", "Mia", "mia", AgentRole::Moderator);
        moderator.expertise = vec!["facilitation".to_string()];
        vec![
            moderator,
            AgentDef::new("ea", "Expert A", "expertA", AgentRole::Participant),
        ]
    }

    fn msg(id: &str, agent_id: &str, content: &str) -> Message {
        MessageDraft::Normal {
            discussion_id: "d1".to_string(),
            agent_id: agent_id.to_string(),
            content: content.to_string(),
            status: Some(MessageStatus::Completed),
        }
        .into_message(id.to_string(), Utc::now())
    }

    fn descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: "search".to_string(),
            description: "Search the web".to_string(),
            schema: json!({"type": "object"}),
        }
    }

    #[test]
    fn test_history_attribution_and_trigger_last() {
        let roster = roster();
        let history = vec![
            msg("m1", "user", "hello @expertA"),
            msg("m2", "mod", "welcome"),
            msg("m3", "ea", "my earlier take"),
            msg("m4", "user", "and now?"),
        ];
        let capabilities = [descriptor()];
        let ctx = PromptContext {
            agent: &roster[1],
            agent_id: "ea",
            can_use_actions: false,
            roster: &roster,
            history: &history,
            trigger: &history[3],
            capabilities: &capabilities,
        };
        let prompt = build_prompt(&ctx);

        assert_eq!(prompt[0].role, PromptRole::System);
        assert!(prompt[0].content.starts_with("You are Expert A (@expertA)"));
        assert!(prompt[0].content.contains("- Mia (@mia, moderator)"));
        assert!(!prompt[0].content.contains("Available capabilities"));

        assert_eq!(prompt[1].content, "hello @expertA");
        assert_eq!(prompt[2].content, "[Mia]: welcome");
        assert_eq!(prompt[2].name.as_deref(), Some("mia"));
        assert_eq!(prompt[3].role, PromptRole::Assistant);
        assert_eq!(prompt.last().unwrap().content, "and now?");
        assert_eq!(prompt.len(), 5);
    }

    #[test]
    fn test_capabilities_only_when_permitted() {
        let roster = roster();
        let history = vec![msg("m1", "user", "go")];
        let capabilities = [descriptor()];
        let ctx = PromptContext {
            agent: &roster[0],
            agent_id: "mod",
            can_use_actions: true,
            roster: &roster,
            history: &history,
            trigger: &history[0],
            capabilities: &capabilities,
        };
        let system = &build_prompt(&ctx)[0].content;
        assert!(system.contains("Expertise: facilitation"));
        assert!(system.contains("- search: Search the web"));
        assert!(system.contains("<action>"));
    }

    #[test]
    fn test_skips_failed_and_empty_messages() {
        let roster = roster();
        let mut failed = msg("m2", "mod", "half");
        if let Message::Normal(m) = &mut failed {
            m.status = Some(MessageStatus::Error);
        }
        let history = vec![msg("m1", "user", "go"), failed, msg("m3", "mod", "  ")];
        let ctx = PromptContext {
            agent: &roster[1],
            agent_id: "ea",
            can_use_actions: false,
            roster: &roster,
            history: &history,
            trigger: &history[0],
            capabilities: &[],
        };
        let prompt = build_prompt(&ctx);
        assert_eq!(prompt.len(), 2);
    }

    #[test]
    fn test_action_results_rendered_as_tool_output() {
        let now = Utc::now();
        let report = ActionResultMessage {
            id: "r1".to_string(),
            discussion_id: "d1".to_string(),
            agent_id: SYSTEM_AGENT_ID.to_string(),
            origin_message_id: "m1".to_string(),
            results: vec![
                ActionResult {
                    operation_id: "op-0".to_string(),
                    capability: "search".to_string(),
                    description: "search".to_string(),
                    params: json!({}),
                    status: ActionStatus::Success,
                    result: Some(json!("found")),
                    error: None,
                    start_time: now,
                    end_time: now,
                },
                ActionResult {
                    operation_id: "op-1".to_string(),
                    capability: "fetch".to_string(),
                    description: "fetch page".to_string(),
                    params: json!({}),
                    status: ActionStatus::Error,
                    result: None,
                    error: Some("timeout".to_string()),
                    start_time: now,
                    end_time: now,
                },
            ],
            timestamp: now,
        };
        let text = render_action_results(&report);
        assert!(text.contains("op-0 search (search): \"found\""));
        assert!(text.contains("op-1 fetch (fetch page): error: timeout"));
    }
}
