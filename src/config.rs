use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::briefing::BriefingDelivery;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    // MindStash backend connection
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub api_token: Option<String>,

    // Local persistence
    #[serde(default = "default_database_path")]
    pub database_path: String,

    // History restore window (matches the server's history cap)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    // Daily briefing delivery tradeoff; the original behavior is at-most-once
    #[serde(default)]
    pub briefing_delivery: BriefingDelivery,
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_database_path() -> String {
    "mindstash_assistant.db".to_string()
}

fn default_history_limit() -> usize {
    50
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_token: None,
            database_path: default_database_path(),
            history_limit: default_history_limit(),
            briefing_delivery: BriefingDelivery::default(),
        }
    }
}

impl AssistantConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    /// Get the path to the config file (relative to executable)
    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join("mindstash_assistant.toml")
    }

    /// Load config from mindstash_assistant.toml next to the executable
    pub fn load() -> Self {
        let path = Self::config_path();

        if let Ok(contents) = fs::read_to_string(&path) {
            match toml::from_str::<AssistantConfig>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    return config;
                }
                Err(e) => {
                    tracing::error!("Failed to parse {:?}: {}", path, e);
                }
            }
        }

        tracing::warn!("No config file found, using defaults + env vars");
        Self::from_env()
    }

    /// Load from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = env::var("MINDSTASH_API_URL") {
            config.api_base_url = url;
        }

        if let Ok(token) = env::var("MINDSTASH_API_TOKEN") {
            let token = token.trim().to_string();
            if !token.is_empty() {
                config.api_token = Some(token);
            }
        }

        if let Ok(path) = env::var("MINDSTASH_DB_PATH") {
            config.database_path = path;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: AssistantConfig = toml::from_str("").expect("parse empty config");
        assert_eq!(config.api_base_url, "http://127.0.0.1:8000");
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.briefing_delivery, BriefingDelivery::AtMostOnce);
    }

    #[test]
    fn briefing_delivery_parses_snake_case() {
        let config: AssistantConfig =
            toml::from_str("briefing_delivery = \"at_least_once\"").expect("parse config");
        assert_eq!(config.briefing_delivery, BriefingDelivery::AtLeastOnce);
    }
}
