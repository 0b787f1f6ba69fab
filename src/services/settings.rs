use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::database::Database;

const SETTINGS_KEY: &str = "app_settings";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Replaces the built-in coach persona when set.
    pub coach_prompt: Option<String>,
    pub temperature: f32,
    /// Overrides the configured history window when set.
    pub history_limit: Option<usize>,
    /// Run action-item extraction on every assistant reply.
    pub auto_extract: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            coach_prompt: None,
            temperature: 0.7,
            history_limit: None,
            auto_extract: true,
        }
    }
}

impl AppSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err("temperature must be between 0 and 2".to_string());
        }
        if self.history_limit == Some(0) {
            return Err("historyLimit must be at least 1".to_string());
        }
        Ok(())
    }
}

pub struct SettingsService;

impl SettingsService {
    pub async fn load(db: &Database) -> AppSettings {
        match db.get_setting(SETTINGS_KEY).await {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("Stored settings are unreadable, using defaults: {}", e);
                AppSettings::default()
            }),
            Ok(None) => AppSettings::default(),
            Err(e) => {
                tracing::warn!("Failed to load settings, using defaults: {}", e);
                AppSettings::default()
            }
        }
    }

    pub async fn save(db: &Database, settings: &AppSettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        db.set_setting(SETTINGS_KEY, &json).await
    }
}
