//! Dispatch configuration.
//!
//! Builder-style with environment overrides:
//! - `VOLCHYA_MODELS`: comma-separated candidate models, best first
//! - `VOLCHYA_TEMPERATURE`: sampling temperature
//! - `VOLCHYA_TIMEOUT_SECS`: per-attempt timeout
//! - `VOLCHYA_MAX_RETRIES`: retries on transient failures

use std::time::Duration;
use thiserror::Error;

/// Candidate models, highest capability first.
pub const DEFAULT_MODELS: &[&str] = &["gemini-3-pro-preview", "gemini-2.5-pro", "gemini-2.5-flash"];

pub const DEFAULT_TEMPERATURE: f32 = 0.9;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Errors from building or validating configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("at least one candidate model must be configured")]
    NoModels,

    #[error("temperature {0} is outside 0.0..=2.0")]
    InvalidTemperature(f32),

    #[error("timeout must be greater than zero")]
    ZeroTimeout,

    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },
}

/// Retry behavior for transient failures on a single candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }

    /// Retry up to `max_retries` times with doubling backoff.
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::none()
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Configuration for the dispatch layer.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Candidate models, tried in order.
    pub models: Vec<String>,

    /// Sampling temperature.
    pub temperature: f32,

    /// Output token cap, if any.
    pub max_output_tokens: Option<usize>,

    /// Bound on a single completion attempt.
    pub timeout: Duration,

    /// Retries on transient failures.
    pub retry: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::none(),
        }
    }
}

impl DispatchConfig {
    /// Defaults overridden by `VOLCHYA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(models) = lookup("VOLCHYA_MODELS") {
            config.models = models
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(value) = lookup("VOLCHYA_TEMPERATURE") {
            config.temperature = parse_var("VOLCHYA_TEMPERATURE", &value)?;
        }

        if let Some(value) = lookup("VOLCHYA_TIMEOUT_SECS") {
            config.timeout = Duration::from_secs(parse_var("VOLCHYA_TIMEOUT_SECS", &value)?);
        }

        if let Some(value) = lookup("VOLCHYA_MAX_RETRIES") {
            config.retry.max_retries = parse_var("VOLCHYA_MAX_RETRIES", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Replace the candidate model list.
    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: usize) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.is_empty() || self.models.iter().any(|m| m.trim().is_empty()) {
            return Err(ConfigError::NoModels);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.models[0], "gemini-3-pro-preview");
        assert_eq!(config.temperature, 0.9);
        assert_eq!(config.retry.max_retries, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = DispatchConfig::from_lookup(lookup(&[
            ("VOLCHYA_MODELS", "alpha, beta ,,gamma"),
            ("VOLCHYA_TEMPERATURE", "0.8"),
            ("VOLCHYA_TIMEOUT_SECS", "30"),
            ("VOLCHYA_MAX_RETRIES", "2"),
        ]))
        .unwrap();

        assert_eq!(config.models, vec!["alpha", "beta", "gamma"]);
        assert_eq!(config.temperature, 0.8);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_retries, 2);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        assert_eq!(
            DispatchConfig::from_lookup(lookup(&[("VOLCHYA_TEMPERATURE", "warm")])),
            Err(ConfigError::InvalidValue {
                var: "VOLCHYA_TEMPERATURE".to_string(),
                value: "warm".to_string(),
            })
        );
        assert_eq!(
            DispatchConfig::from_lookup(lookup(&[("VOLCHYA_MODELS", " , ")])),
            Err(ConfigError::NoModels)
        );
    }

    #[test]
    fn test_validate() {
        let config = DispatchConfig::default();
        assert_eq!(
            config.clone().with_temperature(3.5).validate(),
            Err(ConfigError::InvalidTemperature(3.5))
        );
        assert_eq!(
            config.clone().with_timeout(Duration::ZERO).validate(),
            Err(ConfigError::ZeroTimeout)
        );
        assert_eq!(
            config.with_models(Vec::<String>::new()).validate(),
            Err(ConfigError::NoModels)
        );
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryPolicy::with_retries(5);
        assert_eq!(retry.backoff(1), Duration::from_millis(500));
        assert_eq!(retry.backoff(2), Duration::from_secs(1));
        assert_eq!(retry.backoff(3), Duration::from_secs(2));
        assert_eq!(retry.backoff(10), Duration::from_secs(8));
    }
}
