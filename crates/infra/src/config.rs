//! Engine configuration.
//!
//! Every knob has a default; [`EngineConfig::from_env`] overlays `REPLENISH_*`
//! environment variables on top of them.
//!
//! | variable | meaning | default |
//! |---|---|---|
//! | `REPLENISH_CHECK_INTERVAL_SECS` | monitor poll interval (5-60) | `30` |
//! | `REPLENISH_PROVIDER_TIMEOUT_MS` | per-call provider timeout | `5000` |
//! | `REPLENISH_MAX_ATTEMPTS` | attempts per provider call, including the first (1-5) | `3` |
//! | `REPLENISH_RETRY_BASE_MS` | backoff base delay | `200` |
//! | `REPLENISH_HISTORY_WINDOW_DAYS` | days of history read per Alert | `30` |
//! | `REPLENISH_PROVIDERS` | `name:action@url` entries, comma separated; `dry-run` instead of a url logs only | none |
//! | `REPLENISH_BIND_ADDR` | HTTP bind address | `0.0.0.0:8080` |
//! | `DATABASE_URL` | Postgres url for the persistent ledger | none |
//! | `USE_PERSISTENT_STORES` | use Postgres instead of the in-memory ledger | `false` |

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use replenish_ai::{DiagnosticConfig, PlannerConfig};
use replenish_inventory::ThresholdConfig;
use replenish_inventory::threshold::{MAX_CHECK_INTERVAL_SECS, MIN_CHECK_INTERVAL_SECS};
use replenish_workflow::{CapabilityAction, RetryPolicy};

/// Upper bound on attempts per provider call, including the first.
pub const MAX_PROVIDER_ATTEMPTS: u32 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    fn invalid_value(key: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            message: message.into(),
        }
    }
}

/// Where a configured provider sends its calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum ProviderTarget {
    Webhook(String),
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub name: String,
    pub action: CapabilityAction,
    pub target: ProviderTarget,
}

impl FromStr for ProviderEndpoint {
    type Err = ConfigError;

    /// `name:action@url` or `name:action@dry-run`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |msg: &str| ConfigError::invalid_value("REPLENISH_PROVIDERS", format!("{s}: {msg}"));

        let (head, target) = s.trim().split_once('@').ok_or_else(|| err("missing '@'"))?;
        let (name, action) = head.split_once(':').ok_or_else(|| err("missing ':'"))?;
        if name.trim().is_empty() {
            return Err(err("empty provider name"));
        }
        let action = action
            .trim()
            .parse::<CapabilityAction>()
            .map_err(|e| err(&e.to_string()))?;
        let target = match target.trim() {
            "dry-run" => ProviderTarget::DryRun,
            url if url.starts_with("http://") || url.starts_with("https://") => {
                ProviderTarget::Webhook(url.to_string())
            }
            _ => return Err(err("target must be an http(s) url or 'dry-run'")),
        };

        Ok(Self {
            name: name.trim().to_string(),
            action,
            target,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Monitor poll interval.
    pub check_interval: Duration,
    /// Hard limit on each provider call.
    pub provider_timeout: Duration,
    pub retry: RetryPolicy,
    pub history_window_days: u32,
    pub diagnostic: DiagnosticConfig,
    pub planner: PlannerConfig,
    /// Thresholds for products without a company policy.
    pub default_thresholds: ThresholdConfig,
    pub providers: Vec<ProviderEndpoint>,
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub use_persistent_stores: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            provider_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            history_window_days: 30,
            diagnostic: DiagnosticConfig::default(),
            planner: PlannerConfig::default(),
            default_thresholds: ThresholdConfig::default(),
            providers: Vec::new(),
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            use_persistent_stores: false,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, test map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u64, _>(&lookup, "REPLENISH_CHECK_INTERVAL_SECS")? {
            config.check_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "REPLENISH_PROVIDER_TIMEOUT_MS")? {
            config.provider_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var::<u32, _>(&lookup, "REPLENISH_MAX_ATTEMPTS")? {
            config.retry.max_attempts = n;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "REPLENISH_RETRY_BASE_MS")? {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(days) = parse_var::<u32, _>(&lookup, "REPLENISH_HISTORY_WINDOW_DAYS")? {
            config.history_window_days = days;
        }
        if let Some(raw) = lookup("REPLENISH_PROVIDERS") {
            config.providers = raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse)
                .collect::<Result<_, _>>()?;
        }
        if let Some(addr) = lookup("REPLENISH_BIND_ADDR") {
            config.bind_addr = addr;
        }
        config.database_url = lookup("DATABASE_URL");
        config.use_persistent_stores =
            parse_var::<bool, _>(&lookup, "USE_PERSISTENT_STORES")?.unwrap_or(false);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let secs = self.check_interval.as_secs();
        if !(MIN_CHECK_INTERVAL_SECS..=MAX_CHECK_INTERVAL_SECS).contains(&secs) {
            return Err(ConfigError::invalid_value(
                "REPLENISH_CHECK_INTERVAL_SECS",
                format!(
                    "{secs} is outside {MIN_CHECK_INTERVAL_SECS}..={MAX_CHECK_INTERVAL_SECS}"
                ),
            ));
        }
        if self.provider_timeout.is_zero() {
            return Err(ConfigError::invalid_value(
                "REPLENISH_PROVIDER_TIMEOUT_MS",
                "must be > 0",
            ));
        }
        if !(1..=MAX_PROVIDER_ATTEMPTS).contains(&self.retry.max_attempts) {
            return Err(ConfigError::invalid_value(
                "REPLENISH_MAX_ATTEMPTS",
                format!(
                    "{} is outside 1..={MAX_PROVIDER_ATTEMPTS}",
                    self.retry.max_attempts
                ),
            ));
        }
        if self.history_window_days == 0 {
            return Err(ConfigError::invalid_value(
                "REPLENISH_HISTORY_WINDOW_DAYS",
                "must be >= 1",
            ));
        }
        if self.use_persistent_stores && self.database_url.is_none() {
            return Err(ConfigError::Invalid(
                "DATABASE_URL must be set when USE_PERSISTENT_STORES=true".to_string(),
            ));
        }
        self.default_thresholds
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::invalid_value(key, e.to_string()))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn reads_overrides_and_providers() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("REPLENISH_CHECK_INTERVAL_SECS", "5"),
            ("REPLENISH_MAX_ATTEMPTS", "2"),
            (
                "REPLENISH_PROVIDERS",
                "chat:send_notification@https://hooks.local/chat, tracker:create_task@dry-run",
            ),
        ]))
        .unwrap();

        assert_eq!(config.check_interval, Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(
            config.providers[0].target,
            ProviderTarget::Webhook("https://hooks.local/chat".to_string())
        );
        assert_eq!(config.providers[1].action, CapabilityAction::CreateTask);
        assert_eq!(config.providers[1].target, ProviderTarget::DryRun);
    }

    #[test]
    fn interval_outside_bounds_is_rejected() {
        for secs in ["4", "61"] {
            let err =
                EngineConfig::from_lookup(lookup(&[("REPLENISH_CHECK_INTERVAL_SECS", secs)]))
                    .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "REPLENISH_CHECK_INTERVAL_SECS"));
        }
    }

    #[test]
    fn provider_attempts_outside_bounds_are_rejected() {
        for attempts in ["0", "6", "4294967295"] {
            let err = EngineConfig::from_lookup(lookup(&[("REPLENISH_MAX_ATTEMPTS", attempts)]))
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "REPLENISH_MAX_ATTEMPTS"));
        }
        let config = EngineConfig::from_lookup(lookup(&[("REPLENISH_MAX_ATTEMPTS", "5")])).unwrap();
        assert_eq!(config.retry.max_attempts, MAX_PROVIDER_ATTEMPTS);
    }

    #[test]
    fn persistent_stores_need_a_database_url() {
        let err = EngineConfig::from_lookup(lookup(&[("USE_PERSISTENT_STORES", "true")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_provider_entries_are_rejected() {
        for raw in ["chat", "chat:send_notification", "chat:teleport@dry-run", ":log_row@dry-run"] {
            assert!(raw.parse::<ProviderEndpoint>().is_err(), "{raw}");
        }
    }
}
