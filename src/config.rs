//! # Configuration Module
//!
//! This module defines the runtime configuration of the bot: credentials,
//! upstream endpoints, the translation language, timeouts and the circuit
//! breaker settings. Values come from the environment (optionally seeded from
//! a `.env` file by `dotenv` in `main`).

use std::time::Duration;

use crate::errors::ConfigError;

// Constants for configuration defaults
pub const DEFAULT_MEALDB_BASE_URL: &str = "https://www.themealdb.com/api/json/v1/1/";
pub const DEFAULT_TRANSLATION_BASE_URL: &str = "https://api.mymemory.translated.net";
pub const DEFAULT_TARGET_LANGUAGE: &str = "ru";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Recovery configuration for upstream error handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryConfig {
    /// Timeout for a single external call in seconds
    pub request_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

impl RecoveryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Configuration structure for the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    /// Telegram bot token
    pub telegram_token: String,
    /// Base URL of the recipe catalog, with trailing slash
    pub mealdb_base_url: String,
    /// Base URL of the translation service
    pub translation_base_url: String,
    /// Optional contact e-mail, raises the translation service quota
    pub translation_email: Option<String>,
    /// Language code recipes are translated into, also used for bot messages
    pub target_language: String,
    /// Recovery and error handling configuration
    pub recovery: RecoveryConfig,
}

impl BotConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let telegram_token =
            non_empty("TELEGRAM_BOT_TOKEN").ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?;

        let mut mealdb_base_url =
            non_empty("MEALDB_BASE_URL").unwrap_or_else(|| DEFAULT_MEALDB_BASE_URL.to_string());
        if !mealdb_base_url.ends_with('/') {
            mealdb_base_url.push('/');
        }

        let translation_base_url = non_empty("TRANSLATION_BASE_URL")
            .unwrap_or_else(|| DEFAULT_TRANSLATION_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let target_language = non_empty("TARGET_LANGUAGE")
            .map(|lang| lang.trim().to_lowercase())
            .unwrap_or_else(|| DEFAULT_TARGET_LANGUAGE.to_string());

        let defaults = RecoveryConfig::default();
        let recovery = RecoveryConfig {
            request_timeout_secs: parse_number(
                "REQUEST_TIMEOUT_SECS",
                non_empty("REQUEST_TIMEOUT_SECS"),
                defaults.request_timeout_secs,
            )?,
            circuit_breaker_threshold: parse_number(
                "CIRCUIT_BREAKER_THRESHOLD",
                non_empty("CIRCUIT_BREAKER_THRESHOLD"),
                defaults.circuit_breaker_threshold,
            )?,
            circuit_breaker_reset_secs: parse_number(
                "CIRCUIT_BREAKER_RESET_SECS",
                non_empty("CIRCUIT_BREAKER_RESET_SECS"),
                defaults.circuit_breaker_reset_secs,
            )?,
        };

        Ok(Self {
            telegram_token,
            mealdb_base_url,
            translation_base_url,
            translation_email: non_empty("TRANSLATION_EMAIL"),
            target_language,
            recovery,
        })
    }
}

/// Parse a strictly positive number, falling back to `default` when unset
fn parse_number<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match raw {
        None => Ok(default),
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) if parsed > T::default() => Ok(parsed),
            _ => Err(ConfigError::Invalid { name, value }),
        },
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
    fn test_defaults_applied() {
        let config = BotConfig::from_lookup(lookup_from(&[("TELEGRAM_BOT_TOKEN", "123:abc")])).unwrap();

        assert_eq!(config.telegram_token, "123:abc");
        assert_eq!(config.mealdb_base_url, DEFAULT_MEALDB_BASE_URL);
        assert_eq!(config.translation_base_url, DEFAULT_TRANSLATION_BASE_URL);
        assert_eq!(config.target_language, "ru");
        assert_eq!(config.translation_email, None);
        assert_eq!(config.recovery, RecoveryConfig::default());
        assert_eq!(config.recovery.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_token() {
        let err = BotConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("TELEGRAM_BOT_TOKEN"));

        let err = BotConfig::from_lookup(lookup_from(&[("TELEGRAM_BOT_TOKEN", "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn test_overrides() {
        let config = BotConfig::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("MEALDB_BASE_URL", "http://localhost:8080/api"),
            ("TRANSLATION_BASE_URL", "http://localhost:9090/"),
            ("TARGET_LANGUAGE", " EN "),
            ("REQUEST_TIMEOUT_SECS", "2"),
            ("CIRCUIT_BREAKER_THRESHOLD", "3"),
        ]))
        .unwrap();

        assert_eq!(config.mealdb_base_url, "http://localhost:8080/api/");
        assert_eq!(config.translation_base_url, "http://localhost:9090");
        assert_eq!(config.target_language, "en");
        assert_eq!(config.recovery.request_timeout_secs, 2);
        assert_eq!(config.recovery.circuit_breaker_threshold, 3);
        assert_eq!(config.recovery.circuit_breaker_reset_secs, 60);
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let err = BotConfig::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("REQUEST_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "REQUEST_TIMEOUT_SECS", .. }));

        let err = BotConfig::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("CIRCUIT_BREAKER_RESET_SECS", "a minute"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "CIRCUIT_BREAKER_RESET_SECS", .. }));
    }
}
