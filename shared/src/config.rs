use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("config is not valid JSON: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Tunables for the wallet core. Every field falls back to its default when
/// absent, so shells only send what they override.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub grab_timeout_ms: u64,
    pub bill_screen_timeout_ms: u64,
    pub sheet_dismiss_timeout_ms: u64,
    pub payment_settle_delay_ms: u64,
    pub settlement_timeout_ms: u64,
    pub rescan_suppression_ms: u64,
    pub max_payment_attempts: u32,
    pub recent_scan_capacity: usize,
    pub cash_link_host: String,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grab_timeout_ms: millis(crate::GRAB_TIMEOUT),
            bill_screen_timeout_ms: millis(crate::BILL_SCREEN_TIMEOUT),
            sheet_dismiss_timeout_ms: millis(crate::SHEET_DISMISS_TIMEOUT),
            payment_settle_delay_ms: millis(crate::PAYMENT_SETTLE_DELAY),
            settlement_timeout_ms: millis(crate::SETTLEMENT_TIMEOUT),
            rescan_suppression_ms: millis(crate::RESCAN_SUPPRESSION),
            max_payment_attempts: crate::MAX_PAYMENT_ATTEMPTS,
            recent_scan_capacity: crate::RECENT_SCAN_CAPACITY,
            cash_link_host: crate::CASH_LINK_HOST.to_string(),
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("grab_timeout_ms", self.grab_timeout_ms),
            ("bill_screen_timeout_ms", self.bill_screen_timeout_ms),
            ("sheet_dismiss_timeout_ms", self.sheet_dismiss_timeout_ms),
            ("settlement_timeout_ms", self.settlement_timeout_ms),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Validation(format!("{name} must be > 0")));
        }
        if self.max_payment_attempts == 0 {
            return Err(ConfigError::Validation("max_payment_attempts must be > 0".into()));
        }
        if self.recent_scan_capacity == 0 {
            return Err(ConfigError::Validation("recent_scan_capacity must be > 0".into()));
        }
        if self.cash_link_host.trim().is_empty() {
            return Err(ConfigError::Validation("cash_link_host must not be empty".into()));
        }
        Ok(())
    }

    #[must_use]
    pub const fn grab_timeout(&self) -> Duration {
        Duration::from_millis(self.grab_timeout_ms)
    }

    #[must_use]
    pub const fn bill_screen_timeout(&self) -> Duration {
        Duration::from_millis(self.bill_screen_timeout_ms)
    }

    #[must_use]
    pub const fn sheet_dismiss_timeout(&self) -> Duration {
        Duration::from_millis(self.sheet_dismiss_timeout_ms)
    }

    #[must_use]
    pub const fn payment_settle_delay(&self) -> Duration {
        Duration::from_millis(self.payment_settle_delay_ms)
    }

    #[must_use]
    pub const fn settlement_timeout(&self) -> Duration {
        Duration::from_millis(self.settlement_timeout_ms)
    }

    #[must_use]
    pub const fn rescan_suppression(&self) -> Duration {
        Duration::from_millis(self.rescan_suppression_ms)
    }
}
