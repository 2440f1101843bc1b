//! Pipeline configuration.
//!
//! Loaded from an optional TOML file with environment overrides:
//! `GIGCAL_FEEDS` (comma-separated feed URLs) and `GIGCAL_DATABASE_URL`.

use std::path::Path;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Feed URLs, processed in order.
    #[serde(default)]
    pub feeds: Vec<String>,

    /// IANA timezone the deployment displays events in.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Target city every ingested event is attributed to.
    #[serde(default = "default_city")]
    pub city: String,

    /// Grace window before an elapsed event is swept to `past`.
    #[serde(default = "default_grace_hours")]
    pub grace_hours: i64,

    /// Per-feed fetch timeout.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Postgres connection string. Not needed for --dry-run.
    #[serde(default)]
    pub database_url: Option<String>,
}

fn default_timezone() -> String {
    "America/Chicago".to_string()
}

fn default_city() -> String {
    "Minneapolis".to_string()
}

fn default_grace_hours() -> i64 {
    24
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Config {
            feeds: Vec::new(),
            timezone: default_timezone(),
            city: default_city(),
            grace_hours: default_grace_hours(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            database_url: None,
        }
    }
}

impl Config {
    /// Load from `path` if it exists (defaults otherwise), then apply
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Config> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file at {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file at {}", path.display()))?
        } else {
            Config::default()
        };

        if let Ok(feeds) = std::env::var("GIGCAL_FEEDS") {
            config.feeds = feeds
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(url) = std::env::var("GIGCAL_DATABASE_URL") {
            config.database_url = Some(url);
        }

        Ok(config)
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse()
            .map_err(|_| anyhow::anyhow!("Unknown timezone in config: {}", self.timezone))
    }
}
