// ABOUTME: Extracts @-mentions from text messages and serves them as next-speaker hints
// ABOUTME: Resolves candidates by slug first, then by display-name prefix with a word boundary

use crate::types::{AgentDef, Member, Message};
use std::collections::VecDeque;

/// Opening and closing characters of the quote styles a mention may use
const QUOTE_PAIRS: [(char, char); 5] = [
    ('"', '"'),
    ('\'', '\''),
    ('\u{201C}', '\u{201D}'),
    ('\u{2018}', '\u{2019}'),
    ('\u{300C}', '\u{300D}'),
];

/// Characters that end an unquoted mention
fn is_stop_char(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r'
            | '@'
            | ','
            | ';'
            | ':'
            | '!'
            | '?'
            | '('
            | ')'
            | '['
            | ']'
            | '{'
            | '}'
            | '<'
            | '>'
            | '"'
            | '`'
            | '，'
            | '。'
            | '；'
            | '：'
            | '！'
            | '？'
            | '、'
            | '（'
            | '）'
            | '【'
            | '】'
            | '《'
            | '》'
            | '「'
            | '」'
            | '『'
            | '』'
            | '\u{201C}'
            | '\u{201D}'
            | '\u{2018}'
            | '\u{2019}'
    )
}

/// Punctuation trimmed from both ends of a candidate
fn is_structural(c: char) -> bool {
    c.is_whitespace() || is_stop_char(c) || matches!(c, '.' | '\'' | '…' | '·' | '-')
}

/// Characters allowed right after a display name for a prefix match
fn is_name_boundary(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            ',' | '.'
                | ';'
                | ':'
                | '!'
                | '?'
                | ')'
                | '\''
                | '"'
                | '，'
                | '。'
                | '；'
                | '：'
                | '！'
                | '？'
                | '、'
                | '）'
        )
}

fn normalize(candidate: &str) -> &str {
    candidate.trim_matches(is_structural)
}

/// Pull every mention candidate out of `text`, in order of appearance,
/// deduplicated case-insensitively
pub fn extract_mentions(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut found: Vec<String> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (_, c) = chars[i];
        if c != '@' {
            i += 1;
            continue;
        }
        // Skip addresses like bob@example.com
        if i > 0 && chars[i - 1].1.is_ascii_alphanumeric() {
            i += 1;
            continue;
        }
        let start = i + 1;
        if start >= chars.len() {
            break;
        }
        if chars[start].1.is_whitespace() {
            i = start;
            continue;
        }

        let open = chars[start].1;
        let (raw, next) = if let Some(&(_, close)) = QUOTE_PAIRS.iter().find(|(o, _)| *o == open)
        {
            match chars[start + 1..].iter().position(|&(_, ch)| ch == close) {
                Some(offset) => {
                    let end = start + 1 + offset;
                    (slice(text, &chars, start + 1, end), end + 1)
                }
                // Unterminated quote
                None => {
                    i = start + 1;
                    continue;
                }
            }
        } else {
            let end = chars[start..]
                .iter()
                .position(|&(_, ch)| is_stop_char(ch))
                .map(|offset| start + offset)
                .unwrap_or(chars.len());
            (slice(text, &chars, start, end), end)
        };

        let candidate = normalize(raw);
        if !candidate.is_empty()
            && !found
                .iter()
                .any(|existing| existing.to_lowercase() == candidate.to_lowercase())
        {
            found.push(candidate.to_string());
        }
        i = next.max(i + 1);
    }

    found
}

/// Byte slice of `text` covering char positions `[from, to)`
fn slice<'a>(text: &'a str, chars: &[(usize, char)], from: usize, to: usize) -> &'a str {
    let begin = chars.get(from).map(|&(b, _)| b).unwrap_or(text.len());
    let end = chars.get(to).map(|&(b, _)| b).unwrap_or(text.len());
    &text[begin..end.max(begin)]
}

/// Case-insensitive `strip_prefix` returning the remainder of `text`
fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut want = prefix.chars().flat_map(char::to_lowercase).peekable();
    for (idx, c) in text.char_indices() {
        if want.peek().is_none() {
            return Some(&text[idx..]);
        }
        for lc in c.to_lowercase() {
            if want.next() != Some(lc) {
                return None;
            }
        }
    }
    if want.peek().is_none() {
        Some("")
    } else {
        None
    }
}

/// Resolve one candidate to an agent among `agents`
pub fn resolve_candidate<'a>(candidate: &str, agents: &[&'a AgentDef]) -> Option<&'a AgentDef> {
    let token = candidate
        .split_whitespace()
        .next()
        .map(normalize)
        .unwrap_or_default();
    if !token.is_empty() {
        let token = token.to_lowercase();
        if let Some(agent) = agents.iter().find(|a| a.slug.to_lowercase() == token) {
            return Some(*agent);
        }
    }

    agents
        .iter()
        .filter(|a| !a.name.trim().is_empty())
        .filter(|a| match strip_prefix_ci(candidate, a.name.trim()) {
            Some(rest) => rest.chars().next().map_or(true, is_name_boundary),
            None => false,
        })
        .max_by_key(|a| a.name.trim().chars().count())
        .copied()
}

/// Queue of pending mentions tied to the message they came from
#[derive(Debug, Default)]
pub struct MentionResolver {
    queue: VecDeque<String>,
    message_id: Option<String>,
}

impl MentionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the mentions of `trigger`; repeated feeds of the same message keep
    /// the remaining queue
    pub fn feed(&mut self, trigger: &Message) {
        let Some(text) = trigger.as_text() else {
            return;
        };
        let same_message = self.message_id.as_deref() == Some(text.id.as_str());
        if same_message && !self.queue.is_empty() {
            return;
        }

        let mentions = extract_mentions(&text.content);
        if mentions.is_empty() {
            if same_message {
                self.clear();
            }
            return;
        }

        tracing::debug!(
            message_id = %text.id,
            count = mentions.len(),
            "Queued mentions"
        );
        self.queue = mentions.into();
        self.message_id = Some(text.id.clone());
    }

    /// Pop candidates until one names a current member
    pub fn take_next(&mut self, members: &[Member], agents: &[AgentDef]) -> Option<String> {
        let eligible: Vec<&AgentDef> = agents
            .iter()
            .filter(|a| members.iter().any(|m| m.agent_id == a.id))
            .collect();

        while let Some(candidate) = self.queue.pop_front() {
            if let Some(agent) = resolve_candidate(&candidate, &eligible) {
                tracing::debug!(candidate = %candidate, agent_id = %agent.id, "Mention resolved");
                return Some(agent.id.clone());
            }
            tracing::debug!(candidate = %candidate, "Mention did not resolve to a member");
        }

        self.clear();
        None
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.message_id = None;
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }
}
