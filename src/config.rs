//! # Guard Configuration
//!
//! A guard is configured once, at construction. Hosts can build a
//! [`GuardConfig`] in code, deserialize it as part of their own settings, or
//! read it from the environment:
//!
//! ```bash
//! ACTOR_GUARD_REENTRANCY=disallowed ACTOR_GUARD_ACQUIRE_TIMEOUT_MS=5000 cargo run
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const REENTRANCY_ENV: &str = "ACTOR_GUARD_REENTRANCY";
pub const ACQUIRE_TIMEOUT_ENV: &str = "ACTOR_GUARD_ACQUIRE_TIMEOUT_MS";

/// Errors raised while loading a [`GuardConfig`].
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Unknown reentrancy mode: {0}")]
    UnknownMode(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Reentrancy policy of a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReentrancyMode {
    /// Calls extending the holder's chain re-enter immediately.
    #[default]
    LogicalCallContext,
    /// Nobody re-enters; a same-chain acquire is rejected.
    Disallowed,
}

impl FromStr for ReentrancyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "logical_call_context" | "logicalcallcontext" => Ok(Self::LogicalCallContext),
            "disallowed" => Ok(Self::Disallowed),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Settings fixed for the lifetime of a guard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub mode: ReentrancyMode,
    /// How long a cross-chain caller may wait in the queue. `None` waits forever.
    #[serde(with = "millis")]
    pub acquire_timeout: Option<Duration>,
}

impl GuardConfig {
    pub fn new(mode: ReentrancyMode) -> Self {
        Self {
            mode,
            acquire_timeout: None,
        }
    }

    pub fn with_mode(mut self, mode: ReentrancyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Reads the configuration from `ACTOR_GUARD_*` environment variables.
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(mode) = lookup(REENTRANCY_ENV) {
            config.mode = mode.parse()?;
        }
        if let Some(raw) = lookup(ACQUIRE_TIMEOUT_ENV) {
            let ms: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ACQUIRE_TIMEOUT_ENV,
                value: raw.clone(),
            })?;
            config.acquire_timeout = Some(Duration::from_millis(ms));
        }
        Ok(config)
    }
}

mod millis {
    use serde::ser::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => {
                let ms = u64::try_from(d.as_millis()).map_err(Error::custom)?;
                s.serialize_some(&ms)
            }
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_mode_parsing() {
        assert_eq!(
            "logical_call_context".parse::<ReentrancyMode>(),
            Ok(ReentrancyMode::LogicalCallContext)
        );
        assert_eq!("Disallowed".parse::<ReentrancyMode>(), Ok(ReentrancyMode::Disallowed));
        assert_eq!(
            "logical-call-context".parse::<ReentrancyMode>(),
            Ok(ReentrancyMode::LogicalCallContext)
        );
        assert!(matches!(
            "free_for_all".parse::<ReentrancyMode>(),
            Err(ConfigError::UnknownMode(_))
        ));
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = [(REENTRANCY_ENV, "disallowed"), (ACQUIRE_TIMEOUT_ENV, "250")]
            .into_iter()
            .collect();
        let config = GuardConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.mode, ReentrancyMode::Disallowed);
        assert_eq!(config.acquire_timeout, Some(Duration::from_millis(250)));

        // Nothing set keeps defaults
        let config = GuardConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, GuardConfig::default());

        let err = GuardConfig::from_lookup(|k| (k == ACQUIRE_TIMEOUT_ENV).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: GuardConfig = serde_json::from_str(r#"{"acquire_timeout": 1500}"#).unwrap();
        assert_eq!(config.mode, ReentrancyMode::LogicalCallContext);
        assert_eq!(config.acquire_timeout, Some(Duration::from_millis(1500)));

        let config: GuardConfig = serde_json::from_str(r#"{"mode": "disallowed"}"#).unwrap();
        assert_eq!(config.mode, ReentrancyMode::Disallowed);
        assert_eq!(config.acquire_timeout, None);
    }

    #[test]
    fn test_serialize_timeout_in_millis() {
        let config = GuardConfig::default().with_acquire_timeout(Duration::from_secs(2));
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"mode":"logical_call_context","acquire_timeout":2000}"#);

        // Too many milliseconds for a u64 is an error, not a truncated value
        let config = GuardConfig::default().with_acquire_timeout(Duration::MAX);
        assert!(serde_json::to_string(&config).is_err());
    }
}
