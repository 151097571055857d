use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub api_base_url: Option<String>,
    pub api_timeout_sec: Option<u64>,
    pub poll_interval_secs: Option<u64>,

    // Freshness windows
    pub ttl: Option<TtlConfig>,
}

/// Freshness window overrides, all in seconds.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct TtlConfig {
    pub top_artists_short_secs: Option<i64>,
    pub top_artists_medium_secs: Option<i64>,
    pub top_artists_long_secs: Option<i64>,
    pub top_tracks_short_secs: Option<i64>,
    pub top_tracks_medium_secs: Option<i64>,
    pub top_tracks_long_secs: Option<i64>,
    pub recent_history_secs: Option<i64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
