use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use super::error::{ApiError, ApiJson, ApiResult};
use super::SharedState;
use crate::models::{BusinessPlan, PlanSection, SectionKey};
use crate::services::business_plan;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePlan {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteSection {
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateSection {
    #[serde(default)]
    pub guidance: Option<String>,
}

fn section_key(raw: &str) -> ApiResult<SectionKey> {
    SectionKey::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = SectionKey::ALL.iter().map(SectionKey::as_str).collect();
        ApiError::validation(format!(
            "Unknown section '{}'; expected one of {}",
            raw,
            known.join(", ")
        ))
    })
}

async fn load_plan(state: &SharedState, id: &str) -> ApiResult<BusinessPlan> {
    state
        .db
        .get_plan(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Business plan"))
}

pub async fn list_plans(State(state): State<SharedState>) -> ApiResult<Json<Vec<BusinessPlan>>> {
    Ok(Json(state.db.list_plans().await?))
}

pub async fn create_plan(
    State(state): State<SharedState>,
    ApiJson(body): ApiJson<CreatePlan>,
) -> ApiResult<(StatusCode, Json<BusinessPlan>)> {
    let title = body.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::validation("title must not be empty"));
    }

    let now = Utc::now();
    let plan = BusinessPlan {
        id: uuid::Uuid::new_v4().to_string(),
        title,
        description: body.description.filter(|d| !d.trim().is_empty()),
        sections: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    state.db.insert_plan(&plan).await?;
    tracing::info!(id = %plan.id, "created business plan");
    Ok((StatusCode::CREATED, Json(plan)))
}

pub async fn get_plan(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<BusinessPlan>> {
    Ok(Json(load_plan(&state, &id).await?))
}

pub async fn delete_plan(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.db.delete_plan(&id).await? {
        return Err(ApiError::not_found("Business plan"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn write_section(
    State(state): State<SharedState>,
    Path((id, key)): Path<(String, String)>,
    ApiJson(body): ApiJson<WriteSection>,
) -> ApiResult<Json<PlanSection>> {
    let key = section_key(&key)?;
    load_plan(&state, &id).await?;
    let section = state.db.upsert_section(&id, key, body.content.trim()).await?;
    Ok(Json(section))
}

/// The body is optional; an empty one means no extra guidance.
pub async fn generate_section(
    State(state): State<SharedState>,
    Path((id, key)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<PlanSection>> {
    let key = section_key(&key)?;
    let request: GenerateSection = if body.iter().all(u8::is_ascii_whitespace) {
        GenerateSection::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::validation(format!("Invalid request body: {}", e)))?
    };

    let plan = load_plan(&state, &id).await?;
    let section = business_plan::generate_section(
        &state.db,
        &state.gateway,
        &plan,
        key,
        request.guidance.as_deref(),
    )
    .await?;
    Ok(Json(section))
}
