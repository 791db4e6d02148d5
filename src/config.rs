// src/config.rs
use std::str::FromStr;
use std::time::Duration;

use crate::errors::LuxeError;
use crate::retry::RetryPolicy;
use crate::session::ApiKey;

pub const DEFAULT_MAX_DOWNLOADS: usize = 16;
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub static_dir: String,
    pub api_base: String,
    pub api_key: Option<ApiKey>,
    pub image_model: String,
    pub text_model: String,
    pub video_model: String,
    pub retry: RetryPolicy,
    /// Generation calls allowed in flight per batch.
    pub batch_concurrency: usize,
    pub video_poll_interval: Duration,
    pub http_timeout: Duration,
    /// Finished downloads kept in memory; the oldest are evicted first.
    pub max_downloads: usize,
}

impl Config {
    /// Read configuration from the process environment, after loading `.env`
    /// if one exists.
    pub fn from_env() -> Result<Self, LuxeError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, LuxeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str, default: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let api_key = match lookup("GEMINI_API_KEY").or_else(|| lookup("API_KEY")) {
            Some(key) if !key.trim().is_empty() => Some(ApiKey::new(key)?),
            _ => None,
        };

        Ok(Self {
            bind_addr: text("LUXEFIT_BIND", "0.0.0.0:8080"),
            static_dir: text("LUXEFIT_STATIC_DIR", "static"),
            api_base: text("LUXEFIT_API_BASE", DEFAULT_API_BASE),
            api_key,
            image_model: text("LUXEFIT_IMAGE_MODEL", "gemini-3-pro-image-preview"),
            text_model: text("LUXEFIT_TEXT_MODEL", "gemini-2.5-flash"),
            video_model: text("LUXEFIT_VIDEO_MODEL", "veo-3.1-fast-generate-preview"),
            retry: RetryPolicy::new(
                parse(&lookup, "LUXEFIT_MAX_RETRIES", 5u32)?,
                Duration::from_millis(parse(&lookup, "LUXEFIT_RETRY_DELAY_MS", 4000u64)?),
            ),
            batch_concurrency: parse(&lookup, "LUXEFIT_BATCH_CONCURRENCY", 1usize)?.max(1),
            video_poll_interval: Duration::from_secs(parse(&lookup, "LUXEFIT_VIDEO_POLL_SECS", 10u64)?),
            http_timeout: Duration::from_secs(parse(&lookup, "LUXEFIT_HTTP_TIMEOUT_SECS", 300u64)?),
            max_downloads: parse(&lookup, "LUXEFIT_MAX_DOWNLOADS", DEFAULT_MAX_DOWNLOADS)?.max(1),
        })
    }
}

fn parse<T, F>(lookup: &F, name: &str, default: T) -> Result<T, LuxeError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| LuxeError::Config(format!("{name}={raw}: {e}"))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.batch_concurrency, 1);
        assert!(config.api_key.is_none());
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.max_downloads, DEFAULT_MAX_DOWNLOADS);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "abc"),
            ("LUXEFIT_MAX_RETRIES", "2"),
            ("LUXEFIT_RETRY_DELAY_MS", "250"),
            ("LUXEFIT_BATCH_CONCURRENCY", "0"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.unwrap().expose(), "abc");
        assert_eq!(config.retry, RetryPolicy::new(2, Duration::from_millis(250)));
        assert_eq!(config.batch_concurrency, 1);
    }

    #[test]
    fn malformed_number_is_config_error() {
        let err = Config::from_lookup(lookup_from(&[("LUXEFIT_MAX_RETRIES", "many")])).unwrap_err();
        assert!(matches!(err, LuxeError::Config(_)));
    }
}
