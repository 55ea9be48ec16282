//! Block Kit rendering for outbound replies.

use serde::Serialize;

/// Cap on rendered source citations.
pub const MAX_SOURCES: usize = 5;

/// Every section in an outbound reply is mrkdwn; Slack's other text kinds
/// are not needed here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { text: TextObject },
    Divider,
}

/// A fully rendered outbound message: Block Kit body plus the plain-text
/// fallback Slack shows in notifications.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            fallback_text: text.clone(),
            blocks: vec![Block::Section { text: TextObject::mrkdwn(text) }],
        }
    }
}

/// Render an answer with its citations: question echo, divider, answer, and
/// (when any exist) a bulleted list of at most [`MAX_SOURCES`] source titles.
pub fn answer_message(question: &str, answer: &str, sources: &[String]) -> MessageTemplate {
    let mut blocks = vec![
        Block::Section { text: TextObject::mrkdwn(format!("*Question:* {question}")) },
        Block::Divider,
        Block::Section { text: TextObject::mrkdwn(format!("*Answer:*\n{answer}")) },
    ];

    if !sources.is_empty() {
        let listing = sources
            .iter()
            .take(MAX_SOURCES)
            .map(|title| format!("• {title}"))
            .collect::<Vec<_>>()
            .join("\n");
        blocks.push(Block::Section {
            text: TextObject::mrkdwn(format!("*Referenced documents:*\n{listing}")),
        });
    }

    MessageTemplate { fallback_text: answer.to_owned(), blocks }
}
