use std::sync::Arc;

use crate::config::LlmConfig;
use crate::models::{Message, ProviderId, Role};
use crate::providers::{
    AiProvider, ChatMessage, ChatRequest, ChatResponse, ProviderError, ProviderRouter,
    ResponseFormat,
};
use crate::services::settings::AppSettings;
use crate::services::throttle::LlmThrottle;

/// The last `limit` messages, starting at a user turn.
pub fn trim_history(messages: &[Message], limit: usize) -> &[Message] {
    let start = messages.len().saturating_sub(limit);
    let mut window = &messages[start..];
    while let Some(first) = window.first() {
        if first.role == Role::User {
            break;
        }
        window = &window[1..];
    }
    window
}

/// Convert `Message` list to `ChatMessage` list for the provider API.
pub fn messages_to_chat_messages(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|m| ChatMessage {
            role: m.role,
            content: m.content.clone(),
        })
        .collect()
}

/// Build a `ChatRequest` from the configured provider and current settings.
pub fn build_request(
    config: &LlmConfig,
    settings: &AppSettings,
    chat_messages: Vec<ChatMessage>,
    system_prompt: Option<String>,
    response_format: ResponseFormat,
) -> ChatRequest {
    ChatRequest {
        api_key: config.api_key.clone(),
        model: config.model.clone(),
        messages: chat_messages,
        base_url: config.base_url.clone(),
        temperature: Some(settings.temperature),
        system_prompt,
        max_tokens: config.max_tokens,
        response_format,
    }
}

/// Single way out to the LLM. Every call waits on the shared throttle and
/// goes to the adapter picked for the configured provider.
pub struct ChatGateway {
    provider: Arc<dyn AiProvider>,
    throttle: Arc<LlmThrottle>,
    config: LlmConfig,
}

impl ChatGateway {
    /// Fails when no adapter is registered for `config.provider`.
    pub fn new(
        router: &ProviderRouter,
        throttle: Arc<LlmThrottle>,
        config: LlmConfig,
    ) -> Result<Self, ProviderError> {
        let provider = router.resolve(config.provider)?;
        Ok(Self {
            provider,
            throttle,
            config,
        })
    }

    pub fn provider(&self) -> ProviderId {
        self.config.provider
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn history_limit(&self, settings: &AppSettings) -> usize {
        settings.history_limit.unwrap_or(self.config.history_limit)
    }

    /// Send a stored conversation, trimmed to the history window.
    pub async fn complete(
        &self,
        system_prompt: Option<String>,
        history: &[Message],
        settings: &AppSettings,
        response_format: ResponseFormat,
    ) -> Result<ChatResponse, ProviderError> {
        let window = trim_history(history, self.history_limit(settings));
        self.send(
            system_prompt,
            messages_to_chat_messages(window),
            settings,
            response_format,
        )
        .await
    }

    /// Send prepared messages as-is.
    pub async fn send(
        &self,
        system_prompt: Option<String>,
        messages: Vec<ChatMessage>,
        settings: &AppSettings,
        response_format: ResponseFormat,
    ) -> Result<ChatResponse, ProviderError> {
        let count = messages.len();
        let request = build_request(
            &self.config,
            settings,
            messages,
            system_prompt,
            response_format,
        );

        self.throttle.acquire().await;

        tracing::info!(
            provider = self.config.provider.as_str(),
            model = %self.config.model,
            messages = count,
            "sending LLM request"
        );

        let response = self
            .provider
            .send_message(request)
            .await
            .map_err(|e| {
                tracing::error!("LLM request failed: {}", e);
                e
            })?;

        tracing::info!(
            model = %response.model,
            tokens_in = response.tokens_in,
            tokens_out = response.tokens_out,
            "LLM reply received"
        );
        Ok(response)
    }
}
