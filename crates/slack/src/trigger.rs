//! Trigger evaluation for the two deployment variants.
//!
//! Plain `message` events go through the passive keyword listener; explicit
//! `app_mention` events go through the mention path. Both feed the same
//! downstream pipeline — the variant is selected from the event's declared
//! type, never duplicated end to end.

use propbot_core::config::TriggerConfig;

use crate::events::{EventKind, InboundEvent};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriggerDecision {
    /// Run the full query pipeline with this question text.
    Respond { question: String },
    /// A mention with no remaining text: reply with usage help, skip the backend.
    UsageHint,
    Ignore,
}

pub struct TriggerEvaluator {
    config: TriggerConfig,
}

impl TriggerEvaluator {
    pub fn new(config: TriggerConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, event: &InboundEvent) -> TriggerDecision {
        match event.kind() {
            EventKind::Message => self.evaluate_passive(event),
            EventKind::AppMention => self.evaluate_mention(event),
            EventKind::Other => TriggerDecision::Ignore,
        }
    }

    fn evaluate_passive(&self, event: &InboundEvent) -> TriggerDecision {
        if event.is_from_bot() {
            return TriggerDecision::Ignore;
        }
        // Edits, joins, and other subtyped messages never trigger.
        if event.subtype.is_some() {
            return TriggerDecision::Ignore;
        }
        if !channel_allowed(&self.config.auto_reply_channels, &event.channel) {
            return TriggerDecision::Ignore;
        }

        let text = event.text.to_lowercase();
        let matched = self
            .config
            .keywords
            .iter()
            .filter(|keyword| !keyword.trim().is_empty())
            .any(|keyword| text.contains(&keyword.to_lowercase()));
        if !matched {
            return TriggerDecision::Ignore;
        }

        TriggerDecision::Respond { question: event.text.clone() }
    }

    fn evaluate_mention(&self, event: &InboundEvent) -> TriggerDecision {
        if !channel_allowed(&self.config.allowed_channels, &event.channel) {
            return TriggerDecision::Ignore;
        }

        let question = strip_leading_mention(&event.text);
        if question.is_empty() {
            return TriggerDecision::UsageHint;
        }

        TriggerDecision::Respond { question: question.to_owned() }
    }
}

fn channel_allowed(allowed: &[String], channel: &str) -> bool {
    allowed.is_empty() || allowed.iter().any(|entry| entry == channel)
}

/// Drop one leading `<@ID>` token and surrounding whitespace.
fn strip_leading_mention(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("<@") else {
        return trimmed;
    };
    match rest.find('>') {
        Some(end) => rest[end + 1..].trim(),
        None => trimmed,
    }
}
