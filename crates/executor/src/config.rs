use std::env;
use std::time::Duration;

use pnl::{RunMode, RunSettings};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub database_url: String,
    pub relayer_url: String,
    pub relayer_api_key: String,
    pub relayer_secret_key: String,
    pub mode: RunMode,
    pub call_delay: Duration,
    pub lease_minutes: u32,
    pub telegram: Option<TelegramConfig>,
}

impl ReconcilerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let mode = match get("RUN_MODE") {
            Some(raw) => raw.parse::<RunMode>().map_err(|reason| ConfigError::Invalid {
                name: "RUN_MODE",
                reason,
            })?,
            None => RunMode::default(),
        };

        let call_delay_ms = parse_number::<u64>(get("CALL_DELAY_MS"), "CALL_DELAY_MS", 1000)?;
        let lease_minutes = parse_number::<u32>(get("RUN_LEASE_MINUTES"), "RUN_LEASE_MINUTES", 30)?;
        if lease_minutes == 0 {
            return Err(ConfigError::Invalid {
                name: "RUN_LEASE_MINUTES",
                reason: "must be positive".to_string(),
            });
        }

        let telegram = match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramConfig {
                bot_token,
                chat_id: chat_id.trim().parse().map_err(|_| ConfigError::Invalid {
                    name: "TELEGRAM_CHAT_ID",
                    reason: format!("{chat_id:?} is not a number"),
                })?,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("TELEGRAM_CHAT_ID")),
            (None, Some(_)) => return Err(ConfigError::Missing("TELEGRAM_BOT_TOKEN")),
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            relayer_url: required("RELAYER_URL")?,
            relayer_api_key: required("RELAYER_API_KEY")?,
            relayer_secret_key: required("RELAYER_SECRET_KEY")?,
            mode,
            call_delay: Duration::from_millis(call_delay_ms),
            lease_minutes,
            telegram,
        })
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            mode: self.mode,
            call_delay: self.call_delay,
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            reason: format!("{raw:?} is not a number"),
        }),
        None => Ok(default),
    }
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
        move |name: &str| map.get(name).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("DATABASE_URL", "sqlite://reconciler.db"),
        ("RELAYER_URL", "https://relayer.local"),
        ("RELAYER_API_KEY", "key"),
        ("RELAYER_SECRET_KEY", "secret"),
    ];

    fn with(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        BASE.iter().chain(extra.iter()).copied().collect()
    }

    #[test]
    fn test_defaults() {
        let config = ReconcilerConfig::from_lookup(lookup(BASE)).unwrap();

        assert_eq!(config.mode, RunMode::All);
        assert_eq!(config.call_delay, Duration::from_millis(1000));
        assert_eq!(config.lease_minutes, 30);
        assert!(config.telegram.is_none());
    }

    #[test]
    fn test_missing_required_value() {
        let vars: Vec<_> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "RELAYER_SECRET_KEY")
            .collect();
        let err = ReconcilerConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("RELAYER_SECRET_KEY"));
    }

    #[test]
    fn test_blank_value_is_missing() {
        let vars = with(&[("DATABASE_URL", "  ")]);
        let err = ReconcilerConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn test_overrides() {
        let vars = with(&[
            ("RUN_MODE", "exit"),
            ("CALL_DELAY_MS", "250"),
            ("RUN_LEASE_MINUTES", "5"),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "-100200"),
        ]);
        let config = ReconcilerConfig::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.mode, RunMode::Exit);
        assert_eq!(config.run_settings().call_delay, Duration::from_millis(250));
        assert_eq!(config.lease_minutes, 5);
        assert_eq!(
            config.telegram,
            Some(TelegramConfig {
                bot_token: "123:abc".to_string(),
                chat_id: -100200,
            })
        );
    }

    #[test]
    fn test_invalid_values() {
        let err =
            ReconcilerConfig::from_lookup(lookup(&with(&[("RUN_MODE", "hourly")]))).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "RUN_MODE", .. }));

        let err = ReconcilerConfig::from_lookup(lookup(&with(&[("CALL_DELAY_MS", "soon")])))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "CALL_DELAY_MS", .. }));

        let err = ReconcilerConfig::from_lookup(lookup(&with(&[("RUN_LEASE_MINUTES", "0")])))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "RUN_LEASE_MINUTES", .. }));
    }

    #[test]
    fn test_telegram_needs_both_values() {
        let err = ReconcilerConfig::from_lookup(lookup(&with(&[("TELEGRAM_BOT_TOKEN", "t")])))
            .unwrap_err();
        assert_eq!(err, ConfigError::Missing("TELEGRAM_CHAT_ID"));
    }
}
