use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::Context;
use live_channel::channel_url_from_server_url;

pub const CONFIG_FILE: &str = "session_viewer.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub channel_url: Option<String>,
    pub scope: String,
    pub author_name: String,
    pub scroll_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3000".into(),
            channel_url: None,
            scope: "default".into(),
            author_name: "user".into(),
            scroll_delay_ms: 250,
        }
    }
}

impl Settings {
    /// Explicit channel URL, or the server URL rewritten to its `/ws` endpoint.
    pub fn resolved_channel_url(&self) -> anyhow::Result<String> {
        match &self.channel_url {
            Some(url) => Ok(url.clone()),
            None => channel_url_from_server_url(&self.server_url)
                .with_context(|| format!("cannot derive channel url from {}", self.server_url)),
        }
    }

    pub fn scroll_delay(&self) -> Duration {
        Duration::from_millis(self.scroll_delay_ms)
    }
}

/// Defaults, then `session_viewer.toml` in the working directory, then the
/// process environment.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    if let Some(file_cfg) = read_config_file(Path::new(CONFIG_FILE)) {
        apply_file(&mut settings, &file_cfg);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn read_config_file(path: &Path) -> Option<HashMap<String, String>> {
    let raw = fs::read_to_string(path).ok()?;
    match toml::from_str::<HashMap<String, String>>(&raw) {
        Ok(file_cfg) => Some(file_cfg),
        Err(err) => {
            tracing::warn!(path = %path.display(), "config: ignoring unreadable file: {err}");
            None
        }
    }
}

pub(crate) fn apply_file(settings: &mut Settings, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("server_url") {
        settings.server_url = v.clone();
    }
    if let Some(v) = file_cfg.get("channel_url") {
        settings.channel_url = Some(v.clone());
    }
    if let Some(v) = file_cfg.get("scope") {
        settings.scope = v.clone();
    }
    if let Some(v) = file_cfg.get("author_name") {
        settings.author_name = v.clone();
    }
    if let Some(v) = file_cfg.get("scroll_delay_ms") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.scroll_delay_ms = parsed;
        }
    }
}

/// `SESSION_VIEWER_*` first, then `APP__*`, so the latter wins when both are set.
pub(crate) fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    for key in ["SESSION_VIEWER_SERVER_URL", "APP__SERVER_URL"] {
        if let Some(v) = var(key) {
            settings.server_url = v;
        }
    }
    for key in ["SESSION_VIEWER_CHANNEL_URL", "APP__CHANNEL_URL"] {
        if let Some(v) = var(key) {
            settings.channel_url = Some(v);
        }
    }
    for key in ["SESSION_VIEWER_SCOPE", "APP__SCOPE"] {
        if let Some(v) = var(key) {
            settings.scope = v;
        }
    }
    for key in ["SESSION_VIEWER_AUTHOR_NAME", "APP__AUTHOR_NAME"] {
        if let Some(v) = var(key) {
            settings.author_name = v;
        }
    }
    for key in ["SESSION_VIEWER_SCROLL_DELAY_MS", "APP__SCROLL_DELAY_MS"] {
        if let Some(parsed) = var(key).and_then(|v| v.parse::<u64>().ok()) {
            settings.scroll_delay_ms = parsed;
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
