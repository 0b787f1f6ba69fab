use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::error::{ApiError, ApiJson, ApiQuery, ApiResult};
use super::{delete_node, ensure_conversation, ensure_parent, DeleteParams, Deleted, SharedState};
use crate::models::{ExtractedList, ListInput};
use crate::services::tree::TreeTable;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub conversation_id: Option<String>,
}

/// Trim the title and drop blank entries.
fn clean_input(mut input: ListInput) -> ApiResult<ListInput> {
    input.title = input.title.trim().to_string();
    if input.title.is_empty() {
        return Err(ApiError::validation("title must not be empty"));
    }
    input.items = input
        .items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();
    Ok(input)
}

pub async fn list_lists(
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Json<Vec<ExtractedList>>> {
    Ok(Json(state.db.list_lists(query.conversation_id).await?))
}

pub async fn create_list(
    State(state): State<SharedState>,
    ApiJson(body): ApiJson<ListInput>,
) -> ApiResult<(StatusCode, Json<ExtractedList>)> {
    let input = clean_input(body)?;
    ensure_conversation(&state, input.conversation_id.as_deref()).await?;
    ensure_parent(&state, TreeTable::ExtractedLists, None, input.parent_id.as_deref()).await?;

    let list = state.db.insert_list(input).await?;
    Ok((StatusCode::CREATED, Json(list)))
}

pub async fn get_list(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExtractedList>> {
    state
        .db
        .get_list(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(TreeTable::ExtractedLists.noun()))
}

pub async fn replace_list(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ListInput>,
) -> ApiResult<Json<ExtractedList>> {
    let input = clean_input(body)?;
    if state.db.get_list(&id).await?.is_none() {
        return Err(ApiError::not_found(TreeTable::ExtractedLists.noun()));
    }
    ensure_conversation(&state, input.conversation_id.as_deref()).await?;
    ensure_parent(
        &state,
        TreeTable::ExtractedLists,
        Some(&id),
        input.parent_id.as_deref(),
    )
    .await?;

    state
        .db
        .replace_list(&id, input)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(TreeTable::ExtractedLists.noun()))
}

pub async fn delete_list(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    ApiQuery(params): ApiQuery<DeleteParams>,
) -> ApiResult<Json<Deleted>> {
    delete_node(&state, TreeTable::ExtractedLists, &id, params.delete_children).await
}
