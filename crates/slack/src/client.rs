//! Slack Web API chat client used by the dispatcher for outbound messages.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::blocks::MessageTemplate;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("slack transport failure: {0}")]
    Transport(String),
    #[error("slack {method} returned error: {error}")]
    Api { method: &'static str, error: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

/// Seam to the messaging collaborator; the dispatcher only needs these two
/// calls. Test doubles implement it to record the outbound sequence.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        message: &MessageTemplate,
    ) -> Result<PostedMessage, ChatError>;

    async fn delete_message(&self, channel: &str, ts: &str) -> Result<(), ChatError>;
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    ok: bool,
    ts: Option<String>,
    channel: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatDeleteResponse {
    ok: bool,
    error: Option<String>,
}

pub struct HttpChatClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: SecretString,
}

impl HttpChatClient {
    pub const DEFAULT_API_BASE: &'static str = "https://slack.com/api";

    pub fn new(
        api_base: impl Into<String>,
        bot_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .user_agent("propbot")
            .timeout(timeout)
            .build()
            .map_err(|error| ChatError::Transport(error.to_string()))?;

        Ok(Self { http, api_base: api_base.into().trim_end_matches('/').to_string(), bot_token })
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &'static str,
        body: serde_json::Value,
    ) -> Result<T, ChatError> {
        let response = self
            .http
            .post(format!("{}/{method}", self.api_base))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| ChatError::Transport(error.to_string()))?;

        response.json::<T>().await.map_err(|error| ChatError::Transport(error.to_string()))
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        message: &MessageTemplate,
    ) -> Result<PostedMessage, ChatError> {
        let mut body = json!({
            "channel": channel,
            "text": message.fallback_text,
            "blocks": message.blocks,
        });
        if let Some(thread_ts) = thread_ts {
            body["thread_ts"] = json!(thread_ts);
        }

        let response: ChatMessageResponse = self.call("chat.postMessage", body).await?;
        if !response.ok {
            return Err(ChatError::Api {
                method: "chat.postMessage",
                error: response.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        Ok(PostedMessage {
            channel: response.channel.unwrap_or_else(|| channel.to_owned()),
            ts: response.ts.unwrap_or_default(),
        })
    }

    async fn delete_message(&self, channel: &str, ts: &str) -> Result<(), ChatError> {
        let body = json!({ "channel": channel, "ts": ts });
        let response: ChatDeleteResponse = self.call("chat.delete", body).await?;
        if !response.ok {
            return Err(ChatError::Api {
                method: "chat.delete",
                error: response.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        Ok(())
    }
}
