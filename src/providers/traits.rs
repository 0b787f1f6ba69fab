use async_trait::async_trait;

use super::types::{ChatRequest, ChatResponse, ProviderError};
use crate::models::ProviderId;

#[async_trait]
pub trait AiProvider: Send + Sync {
    fn provider_id(&self) -> ProviderId;

    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}
