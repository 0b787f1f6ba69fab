use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::models::ProviderId;
use crate::services::database::Database;

pub const APP_NAME: &str = "coachdesk";

const ENV_PREFIX: &str = "COACHDESK_";
const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_MIN_INTERVAL_MS: u64 = 1000;
const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_path: PathBuf,
    /// Origins allowed by CORS; empty disables the layer.
    pub cors_origins: Vec<String>,
    pub llm: LlmConfig,
}

#[derive(Clone)]
pub struct LlmConfig {
    pub provider: ProviderId,
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    /// Minimum spacing between outbound calls.
    pub min_interval: Duration,
    /// Number of most recent messages sent as context.
    pub history_limit: usize,
    pub max_tokens: Option<u32>,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("min_interval", &self.min_interval)
            .field("history_limit", &self.history_limit)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

fn default_model(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::Claude => "claude-sonnet-4-5",
        ProviderId::Local => "gpt-4o-mini",
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; names are looked up with the
    /// `COACHDESK_` prefix.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_addr = var("BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse::<SocketAddr>()
            .context("COACHDESK_BIND is not a valid socket address")?;

        let database_path = match var("DATABASE") {
            Some(path) => PathBuf::from(path),
            None => Database::default_path()?,
        };

        let provider = match var("PROVIDER") {
            Some(raw) => ProviderId::from_str(&raw.to_lowercase())
                .ok_or_else(|| anyhow!("Unknown COACHDESK_PROVIDER: {}", raw))?,
            None => ProviderId::Claude,
        };

        let min_interval_ms = match var("LLM_MIN_INTERVAL_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .context("COACHDESK_LLM_MIN_INTERVAL_MS must be an integer")?,
            None => DEFAULT_MIN_INTERVAL_MS,
        };

        let history_limit = match var("HISTORY_LIMIT") {
            Some(raw) => raw
                .parse::<usize>()
                .context("COACHDESK_HISTORY_LIMIT must be an integer")?,
            None => DEFAULT_HISTORY_LIMIT,
        };

        let max_tokens = var("MAX_TOKENS")
            .map(|raw| raw.parse::<u32>())
            .transpose()
            .context("COACHDESK_MAX_TOKENS must be an integer")?;

        let cors_origins = var("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Config {
            bind_addr,
            database_path,
            cors_origins,
            llm: LlmConfig {
                provider,
                api_key: var("API_KEY").unwrap_or_default(),
                model: var("MODEL").unwrap_or_else(|| default_model(provider).to_string()),
                base_url: var("BASE_URL"),
                min_interval: Duration::from_millis(min_interval_ms),
                history_limit: history_limit.max(1),
                max_tokens,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("COACHDESK_DATABASE", "/tmp/c.db")])).unwrap();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND);
        assert_eq!(config.database_path, PathBuf::from("/tmp/c.db"));
        assert_eq!(config.llm.provider, ProviderId::Claude);
        assert_eq!(config.llm.model, "claude-sonnet-4-5");
        assert_eq!(config.llm.min_interval, Duration::from_millis(1000));
        assert_eq!(config.llm.history_limit, 10);
        assert_eq!(config.llm.max_tokens, None);
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("COACHDESK_DATABASE", "/tmp/c.db"),
            ("COACHDESK_BIND", "0.0.0.0:9000"),
            ("COACHDESK_PROVIDER", "Local"),
            ("COACHDESK_BASE_URL", "http://localhost:11434"),
            ("COACHDESK_LLM_MIN_INTERVAL_MS", "250"),
            ("COACHDESK_HISTORY_LIMIT", "4"),
            ("COACHDESK_MAX_TOKENS", "2048"),
            ("COACHDESK_CORS_ORIGINS", "http://localhost:3000, https://coach.example.com"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.llm.provider, ProviderId::Local);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.base_url.as_deref(), Some("http://localhost:11434"));
        assert_eq!(config.llm.min_interval, Duration::from_millis(250));
        assert_eq!(config.llm.history_limit, 4);
        assert_eq!(config.llm.max_tokens, Some(2048));
        assert_eq!(
            config.cors_origins,
            vec!["http://localhost:3000", "https://coach.example.com"]
        );
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(Config::from_lookup(lookup(&[
            ("COACHDESK_DATABASE", "/tmp/c.db"),
            ("COACHDESK_PROVIDER", "gemini"),
        ]))
        .is_err());
        assert!(Config::from_lookup(lookup(&[
            ("COACHDESK_DATABASE", "/tmp/c.db"),
            ("COACHDESK_LLM_MIN_INTERVAL_MS", "soon"),
        ]))
        .is_err());
    }

    #[test]
    fn test_debug_masks_api_key() {
        let config = Config::from_lookup(lookup(&[
            ("COACHDESK_DATABASE", "/tmp/c.db"),
            ("COACHDESK_API_KEY", "sk-secret"),
        ]))
        .unwrap();
        assert!(!format!("{:?}", config).contains("sk-secret"));
    }
}
