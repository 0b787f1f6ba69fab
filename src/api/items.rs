use anyhow::anyhow;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::error::{ApiError, ApiJson, ApiQuery, ApiResult};
use super::{delete_node, ensure_conversation, ensure_parent, DeleteParams, Deleted, SharedState};
use crate::models::{ActionItem, ActionItemPatch, NewActionItem};
use crate::services::database::ItemFilter;
use crate::services::tree::TreeTable;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemQuery {
    pub conversation_id: Option<String>,
    pub parent_id: Option<String>,
    pub message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateItem {
    pub content: String,
    #[serde(default)]
    pub completed: bool,
    /// Appended after the last sibling when absent.
    #[serde(default)]
    pub ordinal: Option<i64>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

async fn next_sibling_ordinal(
    state: &SharedState,
    parent_id: Option<&str>,
    conversation_id: Option<&str>,
) -> ApiResult<i64> {
    match (parent_id, conversation_id) {
        (Some(parent_id), _) => {
            let siblings = state
                .db
                .list_action_items(ItemFilter {
                    parent_id: Some(parent_id.to_string()),
                    ..Default::default()
                })
                .await?;
            Ok(siblings.iter().map(|i| i.ordinal + 1).max().unwrap_or(0))
        }
        (None, Some(conversation_id)) => Ok(state.db.next_item_ordinal(conversation_id).await?),
        (None, None) => Ok(0),
    }
}

pub async fn list_items(
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<ItemQuery>,
) -> ApiResult<Json<Vec<ActionItem>>> {
    let items = state
        .db
        .list_action_items(ItemFilter {
            conversation_id: query.conversation_id,
            parent_id: query.parent_id,
            message_id: query.message_id,
        })
        .await?;
    Ok(Json(items))
}

pub async fn create_item(
    State(state): State<SharedState>,
    ApiJson(body): ApiJson<CreateItem>,
) -> ApiResult<(StatusCode, Json<ActionItem>)> {
    let content = body.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::validation("content must not be empty"));
    }
    ensure_conversation(&state, body.conversation_id.as_deref()).await?;
    ensure_parent(&state, TreeTable::ActionItems, None, body.parent_id.as_deref()).await?;
    if let Some(message_id) = body.message_id.as_deref() {
        if state.db.get_message(message_id).await?.is_none() {
            return Err(ApiError::validation(format!(
                "Message {} does not exist",
                message_id
            )));
        }
    }

    let ordinal = match body.ordinal {
        Some(ordinal) => ordinal,
        None => {
            next_sibling_ordinal(
                &state,
                body.parent_id.as_deref(),
                body.conversation_id.as_deref(),
            )
            .await?
        }
    };

    let stored = state
        .db
        .insert_action_items(vec![NewActionItem {
            content,
            completed: body.completed,
            ordinal,
            parent_id: body.parent_id,
            message_id: body.message_id,
            conversation_id: body.conversation_id,
        }])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Inserted action item was not returned"))?;

    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn get_item(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ActionItem>> {
    state
        .db
        .get_action_item(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(TreeTable::ActionItems.noun()))
}

pub async fn update_item(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    ApiJson(mut patch): ApiJson<ActionItemPatch>,
) -> ApiResult<Json<ActionItem>> {
    if patch.is_empty() {
        return Err(ApiError::validation("Nothing to update"));
    }
    if let Some(content) = patch.content.as_mut() {
        *content = content.trim().to_string();
        if content.is_empty() {
            return Err(ApiError::validation("content must not be empty"));
        }
    }
    if state.db.get_action_item(&id).await?.is_none() {
        return Err(ApiError::not_found(TreeTable::ActionItems.noun()));
    }
    if let Some(Some(parent_id)) = patch.parent_id.as_ref() {
        ensure_parent(&state, TreeTable::ActionItems, Some(&id), Some(parent_id)).await?;
    }

    state
        .db
        .update_action_item(&id, patch)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(TreeTable::ActionItems.noun()))
}

pub async fn delete_item(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    ApiQuery(params): ApiQuery<DeleteParams>,
) -> ApiResult<Json<Deleted>> {
    delete_node(&state, TreeTable::ActionItems, &id, params.delete_children).await
}
