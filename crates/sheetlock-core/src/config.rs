//! Node configuration (TOML).
//!
//! ```toml
//! table = "runs"
//! role = "coordinator"      # or "worker"
//! token = 48151623          # worker では必須
//! verify_reservation = false
//!
//! [retry]
//! max_attempts = 20
//! base_delay_ms = 0
//! multiplier = 2.0
//! max_delay_ms = 0          # base_delay_ms > 0 なら必須
//! jitter = false
//! ```
//!
//! 省略した項目は元のプロトコルと同じ値（20 回、待ちなし、検証なし）になる。

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::app::retry::{ClaimRetryPolicy, RetrySettings};
use crate::domain::{NodeRole, Token};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("role 'worker' requires a token")]
    TokenRequired,

    #[error("retry.max_attempts must be at least 1")]
    NoAttempts,

    #[error("retry.multiplier must be a finite number >= 1.0, got {0}")]
    InvalidMultiplier(f64),

    #[error("retry.max_delay_ms must be set when retry.base_delay_ms is set")]
    UncappedBackoff,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub table: String,

    #[serde(default = "default_role")]
    pub role: NodeRole,

    #[serde(default)]
    pub token: Option<Token>,

    /// 予約の書き込み直後にセルを読み直して確認する
    #[serde(default)]
    pub verify_reservation: bool,

    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_role() -> NodeRole {
    NodeRole::Coordinator
}

impl NodeConfig {
    pub fn new(table: impl Into<String>, role: NodeRole) -> Self {
        Self {
            table: table.into(),
            role,
            token: None,
            verify_reservation: false,
            retry: RetrySettings::default(),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, SettingsError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SettingsError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.role == NodeRole::Worker && self.token.is_none() {
            return Err(SettingsError::TokenRequired);
        }
        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(SettingsError::NoAttempts);
        }
        if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
            return Err(SettingsError::InvalidMultiplier(retry.multiplier));
        }
        if retry.base_delay_ms > 0 && retry.max_delay_ms == 0 {
            return Err(SettingsError::UncappedBackoff);
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> ClaimRetryPolicy {
        ClaimRetryPolicy::from(&self.retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    #[test]
    fn minimal_config_uses_protocol_defaults() {
        let config = NodeConfig::from_toml_str(r#"table = "runs""#).unwrap();
        assert_eq!(config.table, "runs");
        assert_eq!(config.role, NodeRole::Coordinator);
        assert_eq!(config.token, None);
        assert!(!config.verify_reservation);
        assert_eq!(config.retry_policy(), ClaimRetryPolicy::immediate());
    }

    #[test]
    fn full_config() {
        let config = NodeConfig::from_toml_str(
            r#"
            table = "sweep"
            role = "worker"
            token = 48151623
            verify_reservation = true

            [retry]
            max_attempts = 5
            base_delay_ms = 100
            max_delay_ms = 1000
            "#,
        )
        .unwrap();
        assert_eq!(config.role, NodeRole::Worker);
        assert_eq!(config.token, Some(Token::new(48151623).unwrap()));
        assert!(config.verify_reservation);
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.next_delay(1), Duration::from_millis(100));
        assert_eq!(policy.multiplier, 2.0);
    }

    #[test]
    fn worker_without_token_is_rejected() {
        let err = NodeConfig::from_toml_str(
            r#"
            table = "runs"
            role = "worker"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SettingsError::TokenRequired));
    }

    #[test]
    fn reserved_token_is_rejected() {
        let err = NodeConfig::from_toml_str(
            r#"
            table = "runs"
            token = 2
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[rstest]
    #[case::negative("-2.0")]
    #[case::shrinking("0.5")]
    #[case::nan("nan")]
    #[case::infinite("inf")]
    fn bad_multiplier_is_rejected(#[case] multiplier: &str) {
        let err = NodeConfig::from_toml_str(&format!(
            "table = \"runs\"\n[retry]\nbase_delay_ms = 100\nmax_delay_ms = 1000\nmultiplier = {multiplier}"
        ))
        .unwrap_err();
        assert!(matches!(err, SettingsError::InvalidMultiplier(_)));
    }

    #[test]
    fn backoff_without_cap_is_rejected() {
        let err = NodeConfig::from_toml_str(
            r#"
            table = "runs"
            [retry]
            base_delay_ms = 100
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, SettingsError::UncappedBackoff));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(NodeConfig::from_toml_str("table = \"runs\"\nretries = 3").is_err());
    }

    #[tokio::test]
    async fn missing_file() {
        let err = NodeConfig::load("/nonexistent/sheetlock.toml").await.unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
    }
}
