// ABOUTME: Decides which member speaks next given the trigger and last responder
// ABOUTME: Action results return to the actor, mentions win, then auto-reply rotation

use crate::mention::MentionResolver;
use crate::types::{AgentDef, AgentRole, Member, Message};

/// Turn-taking policy; owns the mention queue across turns
#[derive(Debug, Default)]
pub struct SpeakerSelector {
    mentions: MentionResolver,
}

impl SpeakerSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next speaker, or `None` when nobody should reply
    pub fn select(
        &mut self,
        trigger: &Message,
        last_responder: Option<&str>,
        members: &[Member],
        agents: &[AgentDef],
    ) -> Option<String> {
        if members.is_empty() {
            return None;
        }

        if trigger.is_action_result() {
            if let Some(last) = last_responder {
                if members.iter().any(|m| m.agent_id == last) {
                    return Some(last.to_string());
                }
            }
        }

        if trigger.is_text() {
            self.mentions.feed(trigger);
            if let Some(mentioned) = self.mentions.take_next(members, agents) {
                return Some(mentioned);
            }
        }

        if trigger.is_from_user() {
            let pick = members
                .iter()
                .find(|m| m.is_auto_reply)
                .or_else(|| {
                    members.iter().find(|m| {
                        agents
                            .iter()
                            .any(|a| a.id == m.agent_id && a.role == AgentRole::Moderator)
                    })
                })
                .or_else(|| members.first());
            return pick.map(|m| m.agent_id.clone());
        }

        let author = trigger.agent_id();
        members
            .iter()
            .find(|m| m.is_auto_reply && m.agent_id != author)
            .map(|m| m.agent_id.clone())
    }

    /// Forget pending mentions, e.g. after switching discussions
    pub fn reset(&mut self) {
        self.mentions.clear();
    }

    pub fn pending_mentions(&self) -> usize {
        self.mentions.pending()
    }
}
