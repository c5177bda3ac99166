use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::conversation::pagination::DEFAULT_PAGE_SIZE;
use crate::conversation::reply::DEFAULT_HIGHLIGHT_DURATION;

pub(crate) const CONFIG_FILE_NAME: &str = "clario_config.json";
const DEFAULT_API_BASE_URL: &str = "https://api.clario.app";
const DISABLE_NETWORK_ENV: &str = "CLARIO_DISABLE_NETWORK";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) api_base_url: Option<String>,
    pub(crate) access_token: Option<String>,
    pub(crate) page_size: Option<u32>,
    pub(crate) reply_highlight_ms: Option<u64>,
    pub(crate) disable_network: Option<bool>,
}

pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_slice::<AppConfig>(&bytes) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), err = %e, "config unreadable; using defaults");
            AppConfig::default()
        }
    }
}

pub(crate) fn default_app_config_json() -> String {
    let defaults = AppConfig {
        api_base_url: Some(DEFAULT_API_BASE_URL.to_string()),
        access_token: None,
        page_size: Some(DEFAULT_PAGE_SIZE),
        reply_highlight_ms: Some(DEFAULT_HIGHLIGHT_DURATION.as_millis() as u64),
        disable_network: Some(false),
    };
    serde_json::to_string_pretty(&defaults).unwrap_or_else(|_| "{}".to_string())
}

impl AppConfig {
    pub(crate) fn network_enabled(&self) -> bool {
        // Used to keep Rust tests deterministic and offline.
        if let Some(disable) = self.disable_network {
            return !disable;
        }
        std::env::var(DISABLE_NETWORK_ENV).ok().as_deref() != Some("1")
    }

    pub(crate) fn api_base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_API_BASE_URL)
    }

    pub(crate) fn page_size(&self) -> u32 {
        self.page_size.filter(|n| *n > 0).unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub(crate) fn highlight_duration(&self) -> Duration {
        self.reply_highlight_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_HIGHLIGHT_DURATION)
    }
}
