mod conversations;
mod error;
mod items;
mod lists;
mod plans;
mod settings;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::tree::{self, DeleteOutcome, TreeTable};
use crate::services::{ChatGateway, Database};

pub use error::{ApiError, ApiResult};

pub struct AppState {
    pub db: Database,
    pub gateway: ChatGateway,
}

pub type SharedState = Arc<AppState>;

/// `?deleteChildren=true` on tree deletes.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteParams {
    #[serde(default)]
    pub delete_children: bool,
}

/// The referenced conversation must exist.
pub(crate) async fn ensure_conversation(state: &AppState, id: Option<&str>) -> ApiResult<()> {
    if let Some(id) = id {
        if state.db.get_conversation(id).await?.is_none() {
            return Err(ApiError::validation(format!("Conversation {} does not exist", id)));
        }
    }
    Ok(())
}

/// The new parent must exist and must not sit below `id`.
pub(crate) async fn ensure_parent(
    state: &AppState,
    table: TreeTable,
    id: Option<&str>,
    parent_id: Option<&str>,
) -> ApiResult<()> {
    let Some(parent_id) = parent_id else {
        return Ok(());
    };
    if !tree::node_exists(&state.db, table, parent_id).await? {
        return Err(ApiError::validation(format!(
            "Parent {} {} does not exist",
            table.noun().to_lowercase(),
            parent_id
        )));
    }
    if let Some(id) = id {
        if tree::would_create_cycle(&state.db, table, id, parent_id).await? {
            return Err(ApiError::validation(format!(
                "{} cannot be moved under itself or one of its descendants",
                table.noun()
            )));
        }
    }
    Ok(())
}

#[derive(Serialize)]
pub(crate) struct Deleted {
    pub deleted: usize,
}

/// Map a tree delete to the HTTP outcome.
pub(crate) async fn delete_node(
    state: &AppState,
    table: TreeTable,
    id: &str,
    delete_children: bool,
) -> ApiResult<Json<Deleted>> {
    match tree::delete_tree(&state.db, table, id, delete_children).await? {
        DeleteOutcome::NotFound => Err(ApiError::not_found(table.noun())),
        DeleteOutcome::HasChildren { children } => Err(ApiError::validation(format!(
            "{} has {} children; pass deleteChildren=true to delete them too",
            table.noun(),
            children
        ))),
        DeleteOutcome::Deleted { removed } => Ok(Json(Deleted { deleted: removed })),
    }
}

async fn health(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": state.gateway.provider().display_name(),
        "model": state.gateway.model(),
    }))
}

pub fn build_router(state: SharedState, cors_origins: &[String]) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route(
            "/api/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route(
            "/api/conversations/{id}",
            get(conversations::get_conversation)
                .patch(conversations::update_conversation)
                .delete(conversations::delete_conversation),
        )
        .route(
            "/api/conversations/{id}/export",
            get(conversations::export_conversation),
        )
        .route(
            "/api/conversations/{id}/messages",
            post(conversations::send_message),
        )
        .route(
            "/api/conversations/{id}/break-even",
            get(conversations::get_break_even).post(conversations::send_break_even),
        )
        .route(
            "/api/messages/{id}/extract",
            post(conversations::extract_message),
        )
        .route(
            "/api/items",
            get(items::list_items).post(items::create_item),
        )
        .route(
            "/api/items/{id}",
            get(items::get_item)
                .patch(items::update_item)
                .delete(items::delete_item),
        )
        .route("/api/lists", get(lists::list_lists).post(lists::create_list))
        .route(
            "/api/lists/{id}",
            get(lists::get_list)
                .put(lists::replace_list)
                .delete(lists::delete_list),
        )
        .route("/api/plans", get(plans::list_plans).post(plans::create_plan))
        .route(
            "/api/plans/{id}",
            get(plans::get_plan).delete(plans::delete_plan),
        )
        .route(
            "/api/plans/{id}/sections/{key}",
            put(plans::write_section),
        )
        .route(
            "/api/plans/{id}/sections/{key}/generate",
            post(plans::generate_section),
        )
        .route(
            "/api/settings",
            get(settings::get_settings).put(settings::put_settings),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors_origins.is_empty() {
        router
    } else {
        router.layer(build_cors_layer(cors_origins))
    }
}

fn build_cors_layer(cors_origins: &[String]) -> CorsLayer {
    let mut parsed = Vec::new();
    for origin in cors_origins {
        match HeaderValue::from_str(origin) {
            Ok(value) => parsed.push(value),
            Err(err) => tracing::warn!("ignoring invalid CORS origin '{origin}': {err}"),
        }
    }

    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_origin(parsed)
}
