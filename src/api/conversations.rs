use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiJson, ApiResult};
use super::SharedState;
use crate::models::{ActionItem, BreakEvenData, ComputedBreakEven, Conversation, Message};
use crate::services::break_even::format_break_even;
use crate::services::conversation::{self, DEFAULT_TITLE};
use crate::services::database::ItemFilter;
use crate::services::export::export_to_markdown;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateConversation {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateConversation {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "crate::models::double_option")]
    pub system_prompt: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessage {
    pub content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub user_message: Message,
    pub assistant_message: Message,
    pub action_items: Vec<ActionItem>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakEvenView {
    pub data: BreakEvenData,
    pub summary: String,
    pub computed: Option<ComputedBreakEven>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakEvenTurnResponse {
    pub user_message: Message,
    pub assistant_message: Message,
    #[serde(flatten)]
    pub break_even: BreakEvenView,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractResponse {
    pub action_items: Vec<ActionItem>,
}

fn break_even_view(data: BreakEvenData) -> BreakEvenView {
    BreakEvenView {
        summary: format_break_even(&data),
        computed: data.computed_point(),
        data,
    }
}

fn message_content(body: SendMessage) -> ApiResult<String> {
    let content = body.content.trim();
    if content.is_empty() {
        return Err(ApiError::validation("content must not be empty"));
    }
    Ok(content.to_string())
}

async fn load_conversation(state: &SharedState, id: &str) -> ApiResult<Conversation> {
    state
        .db
        .get_conversation(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Conversation"))
}

pub async fn list_conversations(
    State(state): State<SharedState>,
) -> ApiResult<Json<Vec<Conversation>>> {
    Ok(Json(state.db.list_conversations().await?))
}

pub async fn create_conversation(
    State(state): State<SharedState>,
    ApiJson(body): ApiJson<CreateConversation>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let title = body
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let system_prompt = body.system_prompt.filter(|p| !p.trim().is_empty());

    let conversation = Conversation::new(title, system_prompt);
    state.db.insert_conversation(&conversation).await?;
    tracing::info!(id = %conversation.id, "created conversation");
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn get_conversation(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ConversationDetail>> {
    let conversation = load_conversation(&state, &id).await?;
    let messages = state.db.list_messages(&id).await?;
    Ok(Json(ConversationDetail {
        conversation,
        messages,
    }))
}

pub async fn update_conversation(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateConversation>,
) -> ApiResult<Json<Conversation>> {
    if body.title.is_none() && body.system_prompt.is_none() {
        return Err(ApiError::validation("Nothing to update"));
    }
    let title = match body.title.as_deref().map(str::trim) {
        Some("") => return Err(ApiError::validation("title must not be empty")),
        other => other,
    };
    let system_prompt = body
        .system_prompt
        .as_ref()
        .map(|p| p.as_deref().filter(|p| !p.trim().is_empty()));

    if !state.db.update_conversation(&id, title, system_prompt).await? {
        return Err(ApiError::not_found("Conversation"));
    }
    Ok(Json(load_conversation(&state, &id).await?))
}

pub async fn delete_conversation(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.db.delete_conversation(&id).await? {
        return Err(ApiError::not_found("Conversation"));
    }
    tracing::info!(id = %id, "deleted conversation");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn export_conversation(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let conversation = load_conversation(&state, &id).await?;
    let messages = state.db.list_messages(&id).await?;
    let items = state
        .db
        .list_action_items(ItemFilter {
            conversation_id: Some(id),
            ..Default::default()
        })
        .await?;

    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        export_to_markdown(&conversation, &messages, &items),
    ))
}

pub async fn send_message(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<SendMessage>,
) -> ApiResult<Json<TurnResponse>> {
    let content = message_content(body)?;
    let conversation = load_conversation(&state, &id).await?;

    let outcome =
        conversation::send_turn(&state.db, &state.gateway, &conversation, &content).await?;
    Ok(Json(TurnResponse {
        user_message: outcome.user_message,
        assistant_message: outcome.assistant_message,
        action_items: outcome.action_items,
    }))
}

pub async fn get_break_even(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<BreakEvenView>> {
    load_conversation(&state, &id).await?;
    let data = state.db.get_break_even(&id).await?.unwrap_or_default();
    Ok(Json(break_even_view(data)))
}

pub async fn send_break_even(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<SendMessage>,
) -> ApiResult<Json<BreakEvenTurnResponse>> {
    let content = message_content(body)?;
    let conversation = load_conversation(&state, &id).await?;

    let turn =
        conversation::send_break_even_turn(&state.db, &state.gateway, &conversation, &content)
            .await?;
    Ok(Json(BreakEvenTurnResponse {
        user_message: turn.user_message,
        assistant_message: turn.assistant_message,
        break_even: break_even_view(turn.data),
    }))
}

pub async fn extract_message(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExtractResponse>> {
    let message = state
        .db
        .get_message(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Message"))?;

    let action_items = conversation::extract_from_message(&state.db, &message).await?;
    Ok(Json(ExtractResponse { action_items }))
}
