use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use propbot_agent::{GeminiClient, GeminiError};
use propbot_core::config::{AppConfig, ConfigError, LoadOptions};
use propbot_core::QueryResult;
use propbot_slack::client::{ChatError, HttpChatClient};
use propbot_slack::dedupe::EventRegistry;
use propbot_slack::dispatch::{EventDispatcher, QuestionService};
use propbot_slack::signature::SignatureVerifier;
use propbot_slack::trigger::TriggerEvaluator;
use thiserror::Error;
use tracing::info;

const CHAT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Application {
    pub config: AppConfig,
    pub dispatcher: Arc<EventDispatcher>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("slack chat client construction failed: {0}")]
    ChatClient(#[source] ChatError),
    #[error("gemini client construction failed: {0}")]
    Gemini(#[source] GeminiError),
}

/// Adapts the Gemini client to the dispatcher's question seam.
struct GroundedQuestionService {
    client: GeminiClient,
}

#[async_trait]
impl QuestionService for GroundedQuestionService {
    async fn answer(&self, question: &str) -> QueryResult {
        self.client.query(question).await
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let chat = HttpChatClient::new(
        HttpChatClient::DEFAULT_API_BASE,
        config.slack.bot_token.clone(),
        CHAT_TIMEOUT,
    )
    .map_err(BootstrapError::ChatClient)?;

    let gemini = GeminiClient::new(config.gemini.clone()).map_err(BootstrapError::Gemini)?;

    let dispatcher = Arc::new(EventDispatcher::new(
        SignatureVerifier::new(config.slack.signing_secret.clone()),
        EventRegistry::default(),
        TriggerEvaluator::new(config.triggers.clone()),
        Arc::new(GroundedQuestionService { client: gemini }),
        Arc::new(chat),
    ));

    info!(
        event_name = "system.bootstrap.ready",
        model = %config.gemini.model,
        keyword_count = config.triggers.keywords.len(),
        "event pipeline wired"
    );

    Ok(Application { config, dispatcher })
}
