//! Wire types for the Events API envelope.

use serde::Deserialize;

/// Outer payload of a `POST /slack/events` delivery.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventEnvelope {
    /// One-time handshake Slack sends when the webhook URL is registered.
    UrlVerification { challenge: String },
    EventCallback { event_id: String, event: InboundEvent },
    #[serde(other)]
    Unknown,
}

/// The inner event of an `event_callback` envelope, immutable once parsed.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct InboundEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Plain channel message; handled by the passive keyword listener.
    Message,
    /// Explicit `@propbot ...` mention.
    AppMention,
    Other,
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self.event_type.as_str() {
            "message" => EventKind::Message,
            "app_mention" => EventKind::AppMention,
            _ => EventKind::Other,
        }
    }

    pub fn is_from_bot(&self) -> bool {
        self.bot_id.is_some()
    }

    /// Timestamp replies should anchor to: the thread if the message is
    /// already in one, otherwise the message itself.
    pub fn reply_anchor(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}

pub fn parse_envelope(body: &[u8]) -> Result<EventEnvelope, serde_json::Error> {
    serde_json::from_slice(body)
}
