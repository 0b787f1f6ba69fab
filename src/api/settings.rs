use axum::extract::State;
use axum::Json;

use super::error::{ApiError, ApiJson, ApiResult};
use super::SharedState;
use crate::services::{AppSettings, SettingsService};

pub async fn get_settings(State(state): State<SharedState>) -> Json<AppSettings> {
    Json(SettingsService::load(&state.db).await)
}

pub async fn put_settings(
    State(state): State<SharedState>,
    ApiJson(mut settings): ApiJson<AppSettings>,
) -> ApiResult<Json<AppSettings>> {
    settings.validate().map_err(ApiError::Validation)?;
    settings.coach_prompt = settings.coach_prompt.filter(|p| !p.trim().is_empty());

    SettingsService::save(&state.db, &settings).await?;
    tracing::info!("settings updated");
    Ok(Json(settings))
}
