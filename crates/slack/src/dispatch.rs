//! Per-event dispatch: verify → dedupe → trigger → query → reply.
//!
//! Each inbound request runs this pipeline independently; the processed-event
//! registry is the only shared state. The registry check precedes every side
//! effect, so at most one reply is sent per `event_id` per process lifetime.
//!
//! Failure policy follows the taxonomy in `propbot_core::errors`: only an
//! authentication failure surfaces to the HTTP caller as a rejection; every
//! other fault is acknowledged and reported in the chat thread instead, so
//! the platform never re-delivers a poison event.

use std::sync::Arc;

use async_trait::async_trait;
use propbot_core::{EventFailure, QueryResult};
use tracing::{debug, error, info, warn};

use crate::{
    blocks::{answer_message, MessageTemplate},
    client::{ChatClient, ChatError},
    dedupe::EventRegistry,
    events::{parse_envelope, EventEnvelope, InboundEvent},
    signature::SignatureVerifier,
    trigger::{TriggerDecision, TriggerEvaluator},
};

pub const PLACEHOLDER_TEXT: &str = "🔎 Searching the proposal library...";
pub const USAGE_HINT_TEXT: &str =
    "Mention me with a question, e.g. `@propbot which proposals cover AI pilots?`";

/// Seam to the grounded question-answering backend. Infallible by contract:
/// implementations convert their failures into a user-facing `QueryResult`.
#[async_trait]
pub trait QuestionService: Send + Sync {
    async fn answer(&self, question: &str) -> QueryResult;
}

/// Raw transport inputs the dispatcher needs; extraction from the HTTP
/// request stays with the server crate.
#[derive(Clone, Copy, Debug)]
pub struct SignedRequest<'a> {
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub body: &'a [u8],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    Duplicate,
    NotTriggered,
    UnsupportedEvent,
}

/// Terminal state of one dispatched request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handshake payload; the caller must echo the challenge.
    Challenge(String),
    /// Signature rejected; the caller must answer with an authorization error.
    Rejected(EventFailure),
    /// Acknowledged without side effects.
    Ignored(IgnoreReason),
    Replied,
    /// A fault after the trigger stage; acknowledged, diagnostics in-thread.
    Failed(EventFailure),
}

pub struct EventDispatcher {
    verifier: SignatureVerifier,
    registry: EventRegistry,
    trigger: TriggerEvaluator,
    questions: Arc<dyn QuestionService>,
    chat: Arc<dyn ChatClient>,
}

impl EventDispatcher {
    pub fn new(
        verifier: SignatureVerifier,
        registry: EventRegistry,
        trigger: TriggerEvaluator,
        questions: Arc<dyn QuestionService>,
        chat: Arc<dyn ChatClient>,
    ) -> Self {
        Self { verifier, registry, trigger, questions, chat }
    }

    pub async fn dispatch(&self, request: SignedRequest<'_>, now_epoch_secs: i64) -> DispatchOutcome {
        // Verification comes first for every payload, the handshake included.
        if let Err(rejection) =
            self.verifier.verify(request.timestamp, request.signature, request.body, now_epoch_secs)
        {
            warn!(
                event_name = "slack.dispatch.rejected",
                reason = %rejection,
                "rejected inbound request with bad or stale signature"
            );
            return DispatchOutcome::Rejected(EventFailure::Auth(rejection.to_string()));
        }

        let envelope = match parse_envelope(request.body) {
            Ok(envelope) => envelope,
            Err(parse_error) => {
                warn!(
                    event_name = "slack.dispatch.malformed",
                    error = %parse_error,
                    "inbound payload was not a recognizable event envelope"
                );
                return DispatchOutcome::Failed(EventFailure::MalformedPayload(
                    parse_error.to_string(),
                ));
            }
        };

        match envelope {
            EventEnvelope::UrlVerification { challenge } => {
                info!(event_name = "slack.dispatch.handshake", "echoing url_verification challenge");
                DispatchOutcome::Challenge(challenge)
            }
            EventEnvelope::Unknown => DispatchOutcome::Ignored(IgnoreReason::UnsupportedEvent),
            EventEnvelope::EventCallback { event_id, event } => {
                if self.registry.check_and_record(&event_id) {
                    debug!(
                        event_name = "slack.dispatch.duplicate",
                        event_id = %event_id,
                        "suppressing re-delivered event"
                    );
                    return DispatchOutcome::Ignored(IgnoreReason::Duplicate);
                }

                self.handle_callback(&event_id, &event).await
            }
        }
    }

    async fn handle_callback(&self, event_id: &str, event: &InboundEvent) -> DispatchOutcome {
        match self.trigger.evaluate(event) {
            TriggerDecision::Ignore => DispatchOutcome::Ignored(IgnoreReason::NotTriggered),
            TriggerDecision::UsageHint => self.send_usage_hint(event_id, event).await,
            TriggerDecision::Respond { question } => {
                self.respond_with_answer(event_id, event, &question).await
            }
        }
    }

    async fn send_usage_hint(&self, event_id: &str, event: &InboundEvent) -> DispatchOutcome {
        let hint = MessageTemplate::plain(USAGE_HINT_TEXT);
        match self.chat.post_message(&event.channel, Some(event.reply_anchor()), &hint).await {
            Ok(_) => {
                info!(
                    event_name = "slack.dispatch.usage_hint",
                    event_id = %event_id,
                    channel_id = %event.channel,
                    "mention carried no question; sent usage hint"
                );
                DispatchOutcome::Replied
            }
            Err(chat_error) => {
                self.log_messaging_failure(event_id, &chat_error);
                DispatchOutcome::Failed(EventFailure::Messaging(chat_error.to_string()))
            }
        }
    }

    async fn respond_with_answer(
        &self,
        event_id: &str,
        event: &InboundEvent,
        question: &str,
    ) -> DispatchOutcome {
        let channel = event.channel.as_str();
        let anchor = event.reply_anchor();

        let placeholder = MessageTemplate::plain(PLACEHOLDER_TEXT);
        let placeholder_msg = match self.chat.post_message(channel, Some(anchor), &placeholder).await
        {
            Ok(posted) => posted,
            Err(chat_error) => {
                self.log_messaging_failure(event_id, &chat_error);
                let failure = EventFailure::Messaging(chat_error.to_string());
                self.send_best_effort_error(channel, anchor, &failure).await;
                return DispatchOutcome::Failed(failure);
            }
        };

        let result = self.questions.answer(question).await;
        let reply = answer_message(question, &result.answer, &result.sources);

        // Delete failure is tolerated: a stranded placeholder beats a lost
        // answer, and there is no reconciliation path afterwards.
        if let Err(chat_error) =
            self.chat.delete_message(&placeholder_msg.channel, &placeholder_msg.ts).await
        {
            warn!(
                event_name = "slack.dispatch.placeholder_delete_failed",
                event_id = %event_id,
                error = %chat_error,
                "failed to delete placeholder; sending final reply anyway"
            );
        }

        match self.chat.post_message(channel, Some(anchor), &reply).await {
            Ok(_) => {
                info!(
                    event_name = "slack.dispatch.replied",
                    event_id = %event_id,
                    channel_id = %channel,
                    source_count = result.sources.len(),
                    "posted grounded reply"
                );
                DispatchOutcome::Replied
            }
            Err(chat_error) => {
                self.log_messaging_failure(event_id, &chat_error);
                let failure = EventFailure::Messaging(chat_error.to_string());
                self.send_best_effort_error(channel, anchor, &failure).await;
                DispatchOutcome::Failed(failure)
            }
        }
    }

    /// Last-resort diagnostic into the thread; its own failure is swallowed.
    async fn send_best_effort_error(&self, channel: &str, anchor: &str, failure: &EventFailure) {
        let message = MessageTemplate::plain(failure.user_message());
        if let Err(chat_error) = self.chat.post_message(channel, Some(anchor), &message).await {
            error!(
                event_name = "slack.dispatch.error_reply_failed",
                error = %chat_error,
                "could not deliver error reply; giving up on this event"
            );
        }
    }

    fn log_messaging_failure(&self, event_id: &str, chat_error: &ChatError) {
        error!(
            event_name = "slack.dispatch.messaging_failed",
            event_id = %event_id,
            error = %chat_error,
            "outbound messaging call failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    };

    use async_trait::async_trait;
    use propbot_core::config::TriggerConfig;
    use propbot_core::{EventFailure, QueryResult};

    use super::{
        DispatchOutcome, EventDispatcher, IgnoreReason, QuestionService, SignedRequest,
        PLACEHOLDER_TEXT, USAGE_HINT_TEXT,
    };
    use crate::{
        blocks::MessageTemplate,
        client::{ChatClient, ChatError, PostedMessage},
        dedupe::EventRegistry,
        signature::{sign, SignatureVerifier},
        trigger::TriggerEvaluator,
    };

    const SECRET: &str = "test-signing-secret";
    const NOW: i64 = 1_700_000_000;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Post { channel: String, thread_ts: Option<String>, text: String },
        Delete { channel: String, ts: String },
    }

    #[derive(Default)]
    struct RecordingChatClient {
        calls: Mutex<Vec<Call>>,
        fail_posts: bool,
        fail_deletes: bool,
    }

    impl RecordingChatClient {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatClient for RecordingChatClient {
        async fn post_message(
            &self,
            channel: &str,
            thread_ts: Option<&str>,
            message: &MessageTemplate,
        ) -> Result<PostedMessage, ChatError> {
            if self.fail_posts {
                return Err(ChatError::Api { method: "chat.postMessage", error: "ratelimited".into() });
            }
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call::Post {
                channel: channel.to_owned(),
                thread_ts: thread_ts.map(str::to_owned),
                text: message.fallback_text.clone(),
            });
            Ok(PostedMessage { channel: channel.to_owned(), ts: format!("ts-{}", calls.len()) })
        }

        async fn delete_message(&self, channel: &str, ts: &str) -> Result<(), ChatError> {
            if self.fail_deletes {
                return Err(ChatError::Api { method: "chat.delete", error: "cant_delete_message".into() });
            }
            self.calls
                .lock()
                .unwrap()
                .push(Call::Delete { channel: channel.to_owned(), ts: ts.to_owned() });
            Ok(())
        }
    }

    struct StaticQuestionService {
        result: QueryResult,
        called: AtomicBool,
    }

    impl StaticQuestionService {
        fn new(result: QueryResult) -> Self {
            Self { result, called: AtomicBool::new(false) }
        }
    }

    #[async_trait]
    impl QuestionService for StaticQuestionService {
        async fn answer(&self, _question: &str) -> QueryResult {
            self.called.store(true, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn trigger_config() -> TriggerConfig {
        TriggerConfig {
            keywords: vec!["proposal".to_owned()],
            auto_reply_channels: Vec::new(),
            allowed_channels: Vec::new(),
        }
    }

    fn dispatcher(
        chat: Arc<RecordingChatClient>,
        questions: Arc<StaticQuestionService>,
    ) -> EventDispatcher {
        EventDispatcher::new(
            SignatureVerifier::new(SECRET.to_owned().into()),
            EventRegistry::default(),
            TriggerEvaluator::new(trigger_config()),
            questions,
            chat,
        )
    }

    fn signed<'a>(body: &'a [u8], timestamp: &'a str, signature: &'a str) -> SignedRequest<'a> {
        SignedRequest { timestamp: Some(timestamp), signature: Some(signature), body }
    }

    fn callback_body(event_id: &str, text: &str) -> Vec<u8> {
        format!(
            r#"{{"type":"event_callback","event_id":"{event_id}","event":{{"type":"message","channel":"C024","user":"U1","text":"{text}","ts":"1700000001.000200"}}}}"#
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn end_to_end_sends_one_placeholder_one_delete_one_reply() {
        let chat = Arc::new(RecordingChatClient::default());
        let questions = Arc::new(StaticQuestionService::new(QueryResult {
            answer: "answer text".to_owned(),
            sources: vec!["DocX".to_owned()],
        }));
        let dispatcher = dispatcher(Arc::clone(&chat), Arc::clone(&questions));

        let body = callback_body("Ev1", "need a proposal update");
        let timestamp = NOW.to_string();
        let signature = sign(SECRET, &timestamp, &body);

        let outcome = dispatcher.dispatch(signed(&body, &timestamp, &signature), NOW).await;
        assert_eq!(outcome, DispatchOutcome::Replied);

        let calls = chat.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0],
            Call::Post {
                channel: "C024".to_owned(),
                thread_ts: Some("1700000001.000200".to_owned()),
                text: PLACEHOLDER_TEXT.to_owned(),
            }
        );
        assert_eq!(calls[1], Call::Delete { channel: "C024".to_owned(), ts: "ts-1".to_owned() });
        let Call::Post { text, .. } = &calls[2] else { panic!("expected final reply post") };
        assert!(text.contains("answer text"));

        // Redelivery of the identical event_id produces zero additional sends.
        let outcome = dispatcher.dispatch(signed(&body, &timestamp, &signature), NOW).await;
        assert_eq!(outcome, DispatchOutcome::Ignored(IgnoreReason::Duplicate));
        assert_eq!(chat.calls().len(), 3);
    }

    #[tokio::test]
    async fn bad_signature_rejects_before_any_processing() {
        let chat = Arc::new(RecordingChatClient::default());
        let questions = Arc::new(StaticQuestionService::new(QueryResult::ungrounded("unused")));
        let dispatcher = dispatcher(Arc::clone(&chat), Arc::clone(&questions));

        let body = callback_body("Ev2", "proposal");
        let timestamp = NOW.to_string();

        let outcome = dispatcher.dispatch(signed(&body, &timestamp, "v0=deadbeef"), NOW).await;
        assert!(matches!(outcome, DispatchOutcome::Rejected(EventFailure::Auth(_))));
        assert!(chat.calls().is_empty());
        assert!(!questions.called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn handshake_is_echoed_only_when_signed() {
        let chat = Arc::new(RecordingChatClient::default());
        let questions = Arc::new(StaticQuestionService::new(QueryResult::ungrounded("unused")));
        let dispatcher = dispatcher(chat, questions);

        let body = br#"{"type":"url_verification","challenge":"chal-123"}"#;
        let timestamp = NOW.to_string();
        let signature = sign(SECRET, &timestamp, body);

        let outcome = dispatcher.dispatch(signed(body, &timestamp, &signature), NOW).await;
        assert_eq!(outcome, DispatchOutcome::Challenge("chal-123".to_owned()));

        let outcome = dispatcher.dispatch(signed(body, &timestamp, "v0=00"), NOW).await;
        assert!(matches!(outcome, DispatchOutcome::Rejected(EventFailure::Auth(_))));
    }

    #[tokio::test]
    async fn malformed_payload_is_acknowledged_as_a_failure() {
        let chat = Arc::new(RecordingChatClient::default());
        let questions = Arc::new(StaticQuestionService::new(QueryResult::ungrounded("unused")));
        let dispatcher = dispatcher(Arc::clone(&chat), questions);

        let body = b"{not json";
        let timestamp = NOW.to_string();
        let signature = sign(SECRET, &timestamp, body);

        let outcome = dispatcher.dispatch(signed(body, &timestamp, &signature), NOW).await;
        assert!(matches!(outcome, DispatchOutcome::Failed(EventFailure::MalformedPayload(_))));
        assert!(chat.calls().is_empty());
    }

    #[tokio::test]
    async fn untriggered_messages_are_acknowledged_without_side_effects() {
        let chat = Arc::new(RecordingChatClient::default());
        let questions = Arc::new(StaticQuestionService::new(QueryResult::ungrounded("unused")));
        let dispatcher = dispatcher(Arc::clone(&chat), Arc::clone(&questions));

        let body = callback_body("Ev3", "nothing matching here");
        let timestamp = NOW.to_string();
        let signature = sign(SECRET, &timestamp, &body);

        let outcome = dispatcher.dispatch(signed(&body, &timestamp, &signature), NOW).await;
        assert_eq!(outcome, DispatchOutcome::Ignored(IgnoreReason::NotTriggered));
        assert!(chat.calls().is_empty());
    }

    #[tokio::test]
    async fn bare_mention_sends_usage_hint_without_querying_the_backend() {
        let chat = Arc::new(RecordingChatClient::default());
        let questions = Arc::new(StaticQuestionService::new(QueryResult::ungrounded("unused")));
        let dispatcher = dispatcher(Arc::clone(&chat), Arc::clone(&questions));

        let body = br#"{"type":"event_callback","event_id":"Ev4","event":{"type":"app_mention","channel":"C024","user":"U1","text":"<@U99>","ts":"1700000002.000300"}}"#;
        let timestamp = NOW.to_string();
        let signature = sign(SECRET, &timestamp, body);

        let outcome = dispatcher.dispatch(signed(body, &timestamp, &signature), NOW).await;
        assert_eq!(outcome, DispatchOutcome::Replied);
        assert!(!questions.called.load(std::sync::atomic::Ordering::SeqCst));

        let calls = chat.calls();
        assert_eq!(calls.len(), 1);
        let Call::Post { text, .. } = &calls[0] else { panic!("expected usage hint post") };
        assert_eq!(text, USAGE_HINT_TEXT);
    }

    #[tokio::test]
    async fn placeholder_delete_failure_still_delivers_the_final_reply() {
        let chat = Arc::new(RecordingChatClient { fail_deletes: true, ..Default::default() });
        let questions = Arc::new(StaticQuestionService::new(QueryResult::ungrounded("42")));
        let dispatcher = dispatcher(Arc::clone(&chat), questions);

        let body = callback_body("Ev5", "proposal question");
        let timestamp = NOW.to_string();
        let signature = sign(SECRET, &timestamp, &body);

        let outcome = dispatcher.dispatch(signed(&body, &timestamp, &signature), NOW).await;
        assert_eq!(outcome, DispatchOutcome::Replied);

        let calls = chat.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[1], Call::Post { text, .. } if text == "42"));
    }

    #[tokio::test]
    async fn messaging_failure_is_swallowed_after_logging() {
        let chat = Arc::new(RecordingChatClient { fail_posts: true, ..Default::default() });
        let questions = Arc::new(StaticQuestionService::new(QueryResult::ungrounded("unused")));
        let dispatcher = dispatcher(Arc::clone(&chat), questions);

        let body = callback_body("Ev6", "proposal question");
        let timestamp = NOW.to_string();
        let signature = sign(SECRET, &timestamp, &body);

        let outcome = dispatcher.dispatch(signed(&body, &timestamp, &signature), NOW).await;
        assert!(matches!(outcome, DispatchOutcome::Failed(EventFailure::Messaging(_))));
        assert!(chat.calls().is_empty());
    }
}
