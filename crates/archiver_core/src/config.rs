use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Upper bound the message history endpoint accepts for `limit`.
pub const MAX_BATCH_SIZE: u32 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Operator settings for exports and the HTTP listener.
///
/// There is no token here; it only ever arrives per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    pub batch_size: u32,
    pub batch_delay: Duration,
    pub max_batches: Option<u32>,
    pub retry_delay: Duration,
    pub exports_dir: PathBuf,
    pub messages_per_page: usize,
    pub api_base: String,
    pub cdn_base: String,
    pub host: String,
    pub port: u16,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            batch_delay: Duration::from_millis(1000),
            max_batches: None,
            retry_delay: Duration::from_millis(5000),
            exports_dir: PathBuf::from("./exports"),
            messages_per_page: 500,
            api_base: "https://discord.com/api/v10".to_string(),
            cdn_base: "https://cdn.discordapp.com".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ExportConfig {
    /// Builds a config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup; missing or blank
    /// variables keep their defaults.
    ///
    /// | Variable                | Default                        |
    /// |-------------------------|--------------------------------|
    /// | `EXPORT_BATCH_SIZE`     | `100` (clamped to 1..=100)     |
    /// | `EXPORT_BATCH_DELAY_MS` | `1000`                         |
    /// | `EXPORT_MAX_BATCHES`    | unset (0 also means unlimited) |
    /// | `EXPORT_RETRY_DELAY_MS` | `5000`                         |
    /// | `EXPORTS_DIR`           | `./exports`                    |
    /// | `MESSAGES_PER_PAGE`     | `500`                          |
    /// | `DISCORD_API_BASE`      | `https://discord.com/api/v10`  |
    /// | `DISCORD_CDN_BASE`      | `https://cdn.discordapp.com`   |
    /// | `HOST`                  | `127.0.0.1`                    |
    /// | `PORT`                  | `3000`                         |
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let batch_size = match get("EXPORT_BATCH_SIZE") {
            Some(raw) => parse_number::<u32>("EXPORT_BATCH_SIZE", &raw)?.clamp(1, MAX_BATCH_SIZE),
            None => defaults.batch_size,
        };
        let batch_delay = match get("EXPORT_BATCH_DELAY_MS") {
            Some(raw) => Duration::from_millis(parse_number("EXPORT_BATCH_DELAY_MS", &raw)?),
            None => defaults.batch_delay,
        };
        let max_batches = match get("EXPORT_MAX_BATCHES") {
            Some(raw) => Some(parse_number::<u32>("EXPORT_MAX_BATCHES", &raw)?).filter(|n| *n > 0),
            None => None,
        };
        let retry_delay = match get("EXPORT_RETRY_DELAY_MS") {
            Some(raw) => Duration::from_millis(parse_number("EXPORT_RETRY_DELAY_MS", &raw)?),
            None => defaults.retry_delay,
        };
        let messages_per_page = match get("MESSAGES_PER_PAGE") {
            Some(raw) => parse_number::<usize>("MESSAGES_PER_PAGE", &raw)?.max(1),
            None => defaults.messages_per_page,
        };
        let port = match get("PORT") {
            Some(raw) => parse_number("PORT", &raw)?,
            None => defaults.port,
        };

        Ok(Self {
            batch_size,
            batch_delay,
            max_batches,
            retry_delay,
            exports_dir: get("EXPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.exports_dir),
            messages_per_page,
            api_base: get("DISCORD_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            cdn_base: get("DISCORD_CDN_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.cdn_base),
            host: get("HOST").unwrap_or(defaults.host),
            port,
        })
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        name,
        expected: "a non-negative integer",
        value: raw.to_string(),
    })
}
