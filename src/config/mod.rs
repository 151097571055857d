mod file_config;

pub use file_config::FileConfig;

use crate::catalog_client::DEFAULT_API_BASE;
use crate::refresh::TtlPolicy;
use anyhow::Result;
use chrono::Duration;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub api_base_url: Option<String>,
    pub api_timeout_sec: u64,
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub api_base_url: String,
    pub api_timeout_sec: u64,
    pub poll_interval_secs: u64,
    pub ttl: TtlPolicy,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        let api_base_url = file
            .api_base_url
            .or_else(|| cli.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let api_timeout_sec = file.api_timeout_sec.unwrap_or(cli.api_timeout_sec);
        let poll_interval_secs = file.poll_interval_secs.unwrap_or(cli.poll_interval_secs);

        let ttl_file = file.ttl.unwrap_or_default();
        let defaults = TtlPolicy::default();
        let ttl = TtlPolicy {
            top_artists_short: seconds_or(ttl_file.top_artists_short_secs, defaults.top_artists_short),
            top_artists_medium: seconds_or(
                ttl_file.top_artists_medium_secs,
                defaults.top_artists_medium,
            ),
            top_artists_long: seconds_or(ttl_file.top_artists_long_secs, defaults.top_artists_long),
            top_tracks_short: seconds_or(ttl_file.top_tracks_short_secs, defaults.top_tracks_short),
            top_tracks_medium: seconds_or(
                ttl_file.top_tracks_medium_secs,
                defaults.top_tracks_medium,
            ),
            top_tracks_long: seconds_or(ttl_file.top_tracks_long_secs, defaults.top_tracks_long),
            recent_history: seconds_or(ttl_file.recent_history_secs, defaults.recent_history),
        };

        Ok(Self {
            db_path,
            api_base_url,
            api_timeout_sec,
            poll_interval_secs,
            ttl,
        })
    }
}

fn seconds_or(secs: Option<i64>, default: Duration) -> Duration {
    secs.map(Duration::seconds).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_cli() -> CliConfig {
        CliConfig {
            db_path: Some(PathBuf::from("/cli/library.db")),
            api_base_url: None,
            api_timeout_sec: 30,
            poll_interval_secs: 300,
        }
    }

    #[test]
    fn test_resolve_from_cli_only() {
        let config = AppConfig::resolve(&make_cli(), None).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/cli/library.db"));
        assert_eq!(config.api_base_url, DEFAULT_API_BASE);
        assert_eq!(config.poll_interval_secs, 300);
        assert_eq!(config.ttl.recent_history, Duration::minutes(30));
    }

    #[test]
    fn test_toml_overrides_cli() {
        let file: FileConfig = toml::from_str(
            r#"
            db_path = "/toml/library.db"
            poll_interval_secs = 60

            [ttl]
            recent_history_secs = 600
            "#,
        )
        .unwrap();

        let config = AppConfig::resolve(&make_cli(), Some(file)).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/toml/library.db"));
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.ttl.recent_history, Duration::seconds(600));
        // Unset TTL fields keep their defaults
        assert_eq!(config.ttl.top_tracks_short, Duration::days(1));
    }

    #[test]
    fn test_missing_db_path_is_an_error() {
        let cli = CliConfig {
            db_path: None,
            ..make_cli()
        };
        assert!(AppConfig::resolve(&cli, None).is_err());
    }
}
