use async_trait::async_trait;
use reqwest::Client;

use super::models::*;
use crate::models::{ProviderId, Role};
use crate::providers::traits::AiProvider;
use crate::providers::types::*;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const JSON_INSTRUCTION: &str =
    "Respond with a single JSON object and nothing else. Do not wrap it in a code fence.";

pub struct ClaudeProvider {
    client: Client,
}

impl ClaudeProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn base_url(custom: Option<&str>) -> &str {
        custom.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/')
    }

    fn parse_error_message(status: reqwest::StatusCode, body: &str) -> String {
        if let Ok(parsed) = serde_json::from_str::<ClaudeErrorResponse>(body) {
            return format!("HTTP {}: {}", status.as_u16(), parsed.error.message);
        }
        format!("HTTP {}: Request failed", status.as_u16())
    }

    /// The Messages API takes the system prompt separately, so system-role
    /// history entries are folded into it.
    fn build_system(request: &ChatRequest) -> Option<String> {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(prompt) = request.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            parts.push(prompt);
        }
        parts.extend(
            request
                .messages
                .iter()
                .filter(|m| m.role == Role::System)
                .map(|m| m.content.as_str()),
        );
        if request.response_format == ResponseFormat::Json {
            parts.push(JSON_INSTRUCTION);
        }
        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    fn build_messages(messages: &[ChatMessage]) -> Vec<ClaudeMessage> {
        messages
            .iter()
            .filter_map(|msg| {
                let role = match msg.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => return None,
                };
                Some(ClaudeMessage {
                    role: role.to_string(),
                    content: msg.content.clone(),
                })
            })
            .collect()
    }
}

impl Default for ClaudeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AiProvider for ClaudeProvider {
    fn provider_id(&self) -> ProviderId {
        ProviderId::Claude
    }

    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/messages", Self::base_url(request.base_url.as_deref()));

        let claude_request = ClaudeRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: Self::build_messages(&request.messages),
            system: Self::build_system(&request),
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &request.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&claude_request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::AuthError("Invalid API key".to_string()));
        }

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed(Self::parse_error_message(
                status, &body,
            )));
        }

        let claude_response: ClaudeResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let content = claude_response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ClaudeResponseBlock::Text { text } => Some(text),
                ClaudeResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "No content in response".to_string(),
            ));
        }

        let (tokens_in, tokens_out) = claude_response
            .usage
            .map(|u| (u.input_tokens, u.output_tokens))
            .unwrap_or((None, None));

        Ok(ChatResponse {
            content,
            model: claude_response.model,
            tokens_in,
            tokens_out,
        })
    }
}
