//! Explicit runtime configuration. Built once (from the environment or the
//! CLI) and passed by value to whatever needs it; there is no ambient
//! global.

use std::env;

use crate::admission::{AdmissionLimits, DEFAULT_MAX_ACTIVE, DEFAULT_MAX_PER_MINUTE};
use crate::delivery::DEFAULT_POLL_INTERVAL_SECS;
use crate::error::{RemembotError, Result};
use crate::runtime_paths;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub database_path: String,
    pub poll_interval_secs: u64,
    pub limits: AdmissionLimits,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let telegram_token = env::var("REMEMBOT_TELEGRAM_TOKEN").unwrap_or_default();
        let gemini_api_key = env::var("REMEMBOT_GEMINI_API_KEY").unwrap_or_default();

        let config = Self {
            telegram_token,
            gemini_api_key,
            gemini_model: env::var("REMEMBOT_GEMINI_MODEL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
            database_path: env::var("REMEMBOT_DB")
                .unwrap_or_else(|_| runtime_paths::default_db_path()),
            poll_interval_secs: parse_env("REMEMBOT_POLL_INTERVAL", DEFAULT_POLL_INTERVAL_SECS)?,
            limits: AdmissionLimits {
                max_active: parse_env("REMEMBOT_MAX_ACTIVE", DEFAULT_MAX_ACTIVE)?,
                max_per_minute: parse_env("REMEMBOT_MAX_PER_MINUTE", DEFAULT_MAX_PER_MINUTE)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.telegram_token.trim().is_empty() {
            missing.push("REMEMBOT_TELEGRAM_TOKEN");
        }
        if self.gemini_api_key.trim().is_empty() {
            missing.push("REMEMBOT_GEMINI_API_KEY");
        }
        if !missing.is_empty() {
            return Err(RemembotError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(RemembotError::Config(
                "poll interval must be at least one second".to_string(),
            ));
        }
        if self.limits.max_active <= 0 || self.limits.max_per_minute <= 0 {
            return Err(RemembotError::Config(
                "admission limits must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| RemembotError::Config(format!("{name} is not a valid number: {raw}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            telegram_token: "t".to_string(),
            gemini_api_key: "g".to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            database_path: ":memory:".to_string(),
            poll_interval_secs: 10,
            limits: AdmissionLimits::default(),
        }
    }

    #[test]
    fn complete_config_validates() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn missing_secrets_are_named_in_the_error() {
        let mut config = base_config();
        config.telegram_token = String::new();
        config.gemini_api_key = "  ".to_string();
        let err = config.validate().expect_err("must fail");
        let text = format!("{err}");
        assert!(text.contains("REMEMBOT_TELEGRAM_TOKEN"));
        assert!(text.contains("REMEMBOT_GEMINI_API_KEY"));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut config = base_config();
        config.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_positive_limits_are_rejected() {
        let mut config = base_config();
        config.limits.max_active = 0;
        assert!(config.validate().is_err());
    }
}
