//! Runtime configuration read from `ADSYNC_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use adreports_api::{Client, PollPolicy};

use crate::records::GoalColumns;
use crate::window::Lookback;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required setting {0} is not set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_token: String,
    pub client_login: Option<String>,
    pub base_url: Option<String>,
    pub purchase_goal_id: u64,
    pub lead_goal_id: Option<u64>,
    pub attribution_model: String,
    pub db_path: PathBuf,
    pub sync_interval: chrono::Duration,
    pub lookback: Lookback,
    pub poll_policy: PollPolicy,
}

impl SyncConfig {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_token = get("ADSYNC_API_TOKEN").ok_or(ConfigError::Missing("ADSYNC_API_TOKEN"))?;
        let purchase_goal_id = parse_required(&get, "ADSYNC_PURCHASE_GOAL_ID")?;
        let lead_goal_id = parse_optional(&get, "ADSYNC_LEAD_GOAL_ID")?;

        let interval_hours: i64 = parse_optional(&get, "ADSYNC_SYNC_INTERVAL_HOURS")?.unwrap_or(12);
        let sync_interval = chrono::Duration::try_hours(interval_hours)
            .filter(|_| interval_hours >= 0)
            .ok_or_else(|| ConfigError::Invalid {
                key: "ADSYNC_SYNC_INTERVAL_HOURS",
                value: interval_hours.to_string(),
            })?;

        let defaults = Lookback::default();
        let lookback = Lookback {
            trailing_days: parse_optional(&get, "ADSYNC_LOOKBACK_DAYS")?
                .unwrap_or(defaults.trailing_days),
            low_frequency_days: parse_optional(&get, "ADSYNC_LOW_FREQUENCY_LOOKBACK_DAYS")?
                .unwrap_or(defaults.low_frequency_days),
        };

        let policy_defaults = PollPolicy::default();
        let max_attempts: u32 =
            parse_optional(&get, "ADSYNC_MAX_POLL_ATTEMPTS")?.unwrap_or(policy_defaults.max_attempts);
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "ADSYNC_MAX_POLL_ATTEMPTS",
                value: "0".to_string(),
            });
        }
        let default_retry_in = parse_optional(&get, "ADSYNC_DEFAULT_RETRY_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(policy_defaults.default_retry_in);

        Ok(Self {
            api_token,
            client_login: get("ADSYNC_CLIENT_LOGIN"),
            base_url: get("ADSYNC_BASE_URL"),
            purchase_goal_id,
            lead_goal_id,
            attribution_model: get("ADSYNC_ATTRIBUTION_MODEL").unwrap_or_else(|| "LC".to_string()),
            db_path: get("ADSYNC_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("adsync.db")),
            sync_interval,
            lookback,
            poll_policy: PollPolicy {
                max_attempts,
                default_retry_in,
            },
        })
    }

    pub fn goal_columns(&self) -> GoalColumns {
        GoalColumns::new(
            self.purchase_goal_id,
            self.lead_goal_id,
            &self.attribution_model,
        )
    }

    /// Builds the report client with this configuration's poll policy.
    pub fn client(&self) -> Result<Client, adreports_api::Error> {
        let client = match self.base_url {
            Some(ref url) => Client::with_base_url(url, &self.api_token)?,
            None => Client::new(&self.api_token)?,
        };
        let client = match self.client_login {
            Some(ref login) => client.with_client_login(login),
            None => client,
        };
        Ok(client.with_poll_policy(self.poll_policy))
    }
}

fn parse_required<T, G>(get: &G, key: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    parse_optional(get, key)?.ok_or(ConfigError::Missing(key))
}

fn parse_optional<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(None),
    }
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
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("ADSYNC_API_TOKEN", "secret"),
        ("ADSYNC_PURCHASE_GOAL_ID", "12345"),
    ];

    #[test]
    fn defaults_apply() {
        let config = SyncConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.purchase_goal_id, 12345);
        assert_eq!(config.lead_goal_id, None);
        assert_eq!(config.attribution_model, "LC");
        assert_eq!(config.db_path, PathBuf::from("adsync.db"));
        assert_eq!(config.sync_interval, chrono::Duration::hours(12));
        assert_eq!(config.lookback, Lookback::default());
        assert_eq!(config.poll_policy, PollPolicy::default());
        assert_eq!(config.base_url, None);
    }

    #[test]
    fn missing_token_is_reported() {
        let err = SyncConfig::from_lookup(lookup(&[("ADSYNC_PURCHASE_GOAL_ID", "1")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("ADSYNC_API_TOKEN"));
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let err = SyncConfig::from_lookup(lookup(&[
            ("ADSYNC_API_TOKEN", "  "),
            ("ADSYNC_PURCHASE_GOAL_ID", "1"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("ADSYNC_API_TOKEN"));
    }

    #[test]
    fn missing_goal_is_reported() {
        let err = SyncConfig::from_lookup(lookup(&[("ADSYNC_API_TOKEN", "t")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("ADSYNC_PURCHASE_GOAL_ID"));
    }

    #[test]
    fn non_numeric_value_is_invalid() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ADSYNC_LOOKBACK_DAYS", "a week"));
        let err = SyncConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "ADSYNC_LOOKBACK_DAYS",
                value: "a week".to_string()
            }
        );
    }

    #[test]
    fn zero_poll_attempts_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ADSYNC_MAX_POLL_ATTEMPTS", "0"));
        assert!(matches!(
            SyncConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid {
                key: "ADSYNC_MAX_POLL_ATTEMPTS",
                ..
            })
        ));
    }

    #[test]
    fn out_of_range_interval_rejected() {
        for raw in ["-1", "9223372036854775807"] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push(("ADSYNC_SYNC_INTERVAL_HOURS", raw));
            assert_eq!(
                SyncConfig::from_lookup(lookup(&pairs)).unwrap_err(),
                ConfigError::Invalid {
                    key: "ADSYNC_SYNC_INTERVAL_HOURS",
                    value: raw.to_string()
                }
            );
        }
    }

    #[test]
    fn overrides_are_read() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("ADSYNC_LEAD_GOAL_ID", "777"),
            ("ADSYNC_ATTRIBUTION_MODEL", "FC"),
            ("ADSYNC_SYNC_INTERVAL_HOURS", "6"),
            ("ADSYNC_LOOKBACK_DAYS", "14"),
            ("ADSYNC_LOW_FREQUENCY_LOOKBACK_DAYS", "1"),
            ("ADSYNC_MAX_POLL_ATTEMPTS", "3"),
            ("ADSYNC_DEFAULT_RETRY_SECS", "30"),
            ("ADSYNC_CLIENT_LOGIN", "agency-client"),
        ]);
        let config = SyncConfig::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.lead_goal_id, Some(777));
        assert_eq!(config.sync_interval, chrono::Duration::hours(6));
        assert_eq!(config.lookback.trailing_days, 14);
        assert_eq!(config.lookback.low_frequency_days, 1);
        assert_eq!(config.poll_policy.max_attempts, 3);
        assert_eq!(config.poll_policy.default_retry_in, Duration::from_secs(30));
        assert_eq!(config.client_login.as_deref(), Some("agency-client"));

        let goals = config.goal_columns();
        assert_eq!(goals.conversions_column(777), "Conversions_777_FC");
    }

    #[test]
    fn client_uses_configured_policy() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ADSYNC_MAX_POLL_ATTEMPTS", "4"));
        let config = SyncConfig::from_lookup(lookup(&pairs)).unwrap();
        let client = config.client().unwrap();
        assert_eq!(client.poll_policy().max_attempts, 4);
    }
}
