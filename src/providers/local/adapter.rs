use async_trait::async_trait;
use reqwest::Client;

use super::models::*;
use crate::models::{ProviderId, Role};
use crate::providers::traits::AiProvider;
use crate::providers::types::{
    ChatMessage, ChatRequest, ChatResponse, ProviderError, ResponseFormat,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Any server speaking the OpenAI chat-completions protocol.
pub struct LocalProvider {
    client: Client,
}

impl LocalProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn translate_role(role: &Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    fn build_messages(system_prompt: Option<&str>, messages: &[ChatMessage]) -> Vec<OpenAiMessage> {
        let mut result = Vec::new();

        if let Some(prompt) = system_prompt {
            if !prompt.is_empty() {
                result.push(OpenAiMessage {
                    role: "system".to_string(),
                    content: Some(prompt.to_string()),
                });
            }
        }

        for msg in messages {
            result.push(OpenAiMessage {
                role: Self::translate_role(&msg.role).to_string(),
                content: Some(msg.content.clone()),
            });
        }

        result
    }

    fn completions_url(base_url: Option<&str>) -> String {
        let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    fn build_auth_header(api_key: &str) -> Option<String> {
        if api_key.is_empty() {
            None
        } else {
            Some(format!("Bearer {}", api_key))
        }
    }

    fn parse_error_message(status: reqwest::StatusCode, body: &str) -> String {
        if let Ok(parsed) = serde_json::from_str::<OpenAiErrorResponse>(body) {
            return format!("HTTP {}: {}", status.as_u16(), parsed.error.message);
        }
        format!("HTTP {}: Request failed", status.as_u16())
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AiProvider for LocalProvider {
    fn provider_id(&self) -> ProviderId {
        ProviderId::Local
    }

    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = Self::completions_url(request.base_url.as_deref());

        let messages = Self::build_messages(request.system_prompt.as_deref(), &request.messages);

        let openai_request = OpenAiRequest {
            model: request.model.clone(),
            messages,
            stream: false,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: match request.response_format {
                ResponseFormat::Json => Some(OpenAiResponseFormat {
                    format_type: "json_object".to_string(),
                }),
                ResponseFormat::Text => None,
            },
        };

        let mut req = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&openai_request);

        if let Some(auth) = Self::build_auth_header(&request.api_key) {
            req = req.header("Authorization", auth);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::AuthError("Invalid API key".to_string()));
        }

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after_secs: None,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed(Self::parse_error_message(
                status, &body,
            )));
        }

        let openai_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let content = openai_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "No content in response".to_string(),
            ));
        }

        let (tokens_in, tokens_out) = openai_response
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((None, None));

        Ok(ChatResponse {
            content,
            model: openai_response.model.unwrap_or(request.model),
            tokens_in,
            tokens_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url_accepts_versioned_and_bare_bases() {
        assert_eq!(
            LocalProvider::completions_url(Some("http://localhost:11434/")),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(
            LocalProvider::completions_url(Some("https://api.example.com/v1")),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            LocalProvider::completions_url(None),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_system_prompt_leads_history() {
        let history = vec![ChatMessage {
            role: Role::User,
            content: "What should I charge?".to_string(),
        }];
        let messages = LocalProvider::build_messages(Some("Be concise."), &history);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content.as_deref(), Some("What should I charge?"));

        assert_eq!(LocalProvider::build_messages(Some(""), &history).len(), 1);
    }
}
