use thiserror::Error;

/// Typed failure taxonomy for the inbound event pipeline.
///
/// Only `Auth` crosses the boundary back to the HTTP caller as a non-200
/// response; every other variant resolves to an acknowledgment so the
/// platform does not re-deliver, with diagnostics surfaced in the chat
/// thread instead.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EventFailure {
    #[error("request signature rejected: {0}")]
    Auth(String),
    #[error("question-answering backend failed: {0}")]
    Backend(String),
    #[error("outbound messaging failed: {0}")]
    Messaging(String),
    #[error("malformed event payload: {0}")]
    MalformedPayload(String),
}

impl EventFailure {
    /// Short message suitable for posting into the originating thread.
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(_) => "This request could not be authenticated.".to_owned(),
            Self::Backend(detail) => format!("❌ Something went wrong: {detail}"),
            Self::Messaging(detail) => format!("❌ Something went wrong: {detail}"),
            Self::MalformedPayload(_) => {
                "❌ The event payload could not be understood.".to_owned()
            }
        }
    }
}
