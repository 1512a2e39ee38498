use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub user_id: i64,
    pub bearer_token: Option<String>,
    pub debounce_ms: u64,
    pub request_timeout_secs: u64,
    pub search_limit: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8000".into(),
            user_id: 1,
            bearer_token: None,
            debounce_ms: 300,
            request_timeout_secs: 15,
            search_limit: 10,
        }
    }
}

impl Settings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    api_url: Option<String>,
    user_id: Option<i64>,
    bearer_token: Option<String>,
    debounce_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
    search_limit: Option<u32>,
}

/// Defaults, then the toml file (if it exists), then environment overrides.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    load_settings_with(path, |key| std::env::var(key).ok())
}

fn load_settings_with(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
        let file_cfg: FileSettings = toml::from_str(&raw)
            .with_context(|| format!("invalid settings file '{}'", path.display()))?;
        if let Some(v) = file_cfg.api_url {
            settings.api_url = v;
        }
        if let Some(v) = file_cfg.user_id {
            settings.user_id = v;
        }
        if let Some(v) = file_cfg.bearer_token {
            settings.bearer_token = Some(v);
        }
        if let Some(v) = file_cfg.debounce_ms {
            settings.debounce_ms = v;
        }
        if let Some(v) = file_cfg.request_timeout_secs {
            settings.request_timeout_secs = v;
        }
        if let Some(v) = file_cfg.search_limit {
            settings.search_limit = v;
        }
    }

    if let Some(v) = env("SUBCTL_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = env("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = env("APP__USER_ID") {
        settings.user_id = v
            .parse()
            .with_context(|| format!("APP__USER_ID must be an integer, got '{v}'"))?;
    }

    if let Some(v) = env("SUBCTL_TOKEN") {
        settings.bearer_token = Some(v);
    }

    if let Some(v) = env("APP__DEBOUNCE_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.debounce_ms = parsed;
        }
    }
    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    Ok(settings)
}
