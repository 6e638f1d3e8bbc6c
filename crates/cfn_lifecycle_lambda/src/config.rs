use std::str::FromStr;

use cfn_lifecycle_core::poll::{DEFAULT_POLL_SCHEDULE, DEFAULT_RULE_PREFIX};
use thiserror::Error;

pub const POLL_SCHEDULE_ENV: &str = "POLL_SCHEDULE_EXPRESSION";
pub const POLL_RULE_PREFIX_ENV: &str = "POLL_RULE_PREFIX";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

pub const DEFAULT_LOG_LEVEL: &str = "warn";
const MAX_RULE_PREFIX_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("POLL_SCHEDULE_EXPRESSION must be a rate(...) or cron(...) expression, got '{0}'")]
    InvalidSchedule(String),

    #[error("POLL_RULE_PREFIX must be 1-40 characters of [A-Za-z0-9._-], got '{0}'")]
    InvalidRulePrefix(String),

    #[error("LOG_FORMAT must be 'json' or 'pretty', got '{0}'")]
    InvalidLogFormat(String),

    #[error("LOG_LEVEL is not a recognised level, got '{0}'")]
    InvalidLogLevel(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => Err(ConfigError::InvalidLogFormat(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub schedule_expression: String,
    pub rule_prefix: String,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            schedule_expression: DEFAULT_POLL_SCHEDULE.to_string(),
            rule_prefix: DEFAULT_RULE_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub poll: PollSettings,
    pub log_format: LogFormat,
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll: PollSettings::default(),
            log_format: LogFormat::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let schedule_expression = match read(POLL_SCHEDULE_ENV) {
            Some(value) => validate_schedule(value)?,
            None => defaults.poll.schedule_expression,
        };
        let rule_prefix = match read(POLL_RULE_PREFIX_ENV) {
            Some(value) => validate_rule_prefix(value)?,
            None => defaults.poll.rule_prefix,
        };
        let log_format = match read(LOG_FORMAT_ENV) {
            Some(value) => value.parse()?,
            None => defaults.log_format,
        };
        let log_level = match read(LOG_LEVEL_ENV) {
            Some(value) => normalize_level(&value)
                .ok_or(ConfigError::InvalidLogLevel(value))?
                .to_string(),
            None => defaults.log_level,
        };

        Ok(Self {
            poll: PollSettings {
                schedule_expression,
                rule_prefix,
            },
            log_format,
            log_level,
        })
    }
}

/// Maps level names (including Python-style `warning`/`critical`) onto
/// `tracing` directives.
pub fn normalize_level(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" | "fatal" => Some("error"),
        "off" => Some("off"),
        _ => None,
    }
}

fn validate_schedule(value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    let well_formed = (trimmed.starts_with("rate(") || trimmed.starts_with("cron("))
        && trimmed.ends_with(')');
    if well_formed {
        Ok(trimmed.to_string())
    } else {
        Err(ConfigError::InvalidSchedule(value))
    }
}

fn validate_rule_prefix(value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    let well_formed = trimmed.len() <= MAX_RULE_PREFIX_LEN
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if well_formed {
        Ok(trimmed.to_string())
    } else {
        Err(ConfigError::InvalidRulePrefix(value))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<RuntimeConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        RuntimeConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).expect("defaults should load");
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.poll.schedule_expression, "rate(2 minutes)");
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            (POLL_SCHEDULE_ENV, "rate(1 minute)"),
            (POLL_RULE_PREFIX_ENV, "NestedStackPoll"),
            (LOG_FORMAT_ENV, "Pretty"),
            (LOG_LEVEL_ENV, "warning"),
        ])
        .expect("config should load");

        assert_eq!(config.poll.schedule_expression, "rate(1 minute)");
        assert_eq!(config.poll.rule_prefix, "NestedStackPoll");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config_from(&[(POLL_SCHEDULE_ENV, "  ")]).expect("config should load");
        assert_eq!(config.poll.schedule_expression, DEFAULT_POLL_SCHEDULE);
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(
            config_from(&[(POLL_SCHEDULE_ENV, "every 2 minutes")]),
            Err(ConfigError::InvalidSchedule("every 2 minutes".to_string()))
        );
        assert!(matches!(
            config_from(&[(POLL_RULE_PREFIX_ENV, "has spaces")]),
            Err(ConfigError::InvalidRulePrefix(_))
        ));
        assert!(matches!(
            config_from(&[(LOG_FORMAT_ENV, "xml")]),
            Err(ConfigError::InvalidLogFormat(_))
        ));
        assert!(matches!(
            config_from(&[(LOG_LEVEL_ENV, "loud")]),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }
}
