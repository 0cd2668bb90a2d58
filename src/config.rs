use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::dispatcher::DispatcherConfig;
use crate::error::{OmsError, OmsResult};
use crate::oms::ValidationConfig;
use crate::ratelimit::RateLimiterConfig;
use crate::session::TradingWindow;

/// Order manager configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OmsConfig {
    /// Daily trading window
    #[serde(default)]
    pub window: WindowConfig,

    /// Dispatch rate limit
    #[serde(default)]
    pub rate_limit: RateLimiterConfig,

    /// Background dispatcher
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Response log destination
    #[serde(default)]
    pub response_log: ResponseLogConfig,

    /// Order field limits
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Trading window configuration, times of day in UTC
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window opening time (inclusive)
    #[serde(default = "default_window_start")]
    pub start: NaiveTime,

    /// Window closing time (inclusive)
    #[serde(default = "default_window_end")]
    pub end: NaiveTime,
}

impl WindowConfig {
    pub fn trading_window(&self) -> OmsResult<TradingWindow> {
        TradingWindow::new(self.start, self.end)
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            start: default_window_start(),
            end: default_window_end(),
        }
    }
}

/// Response log configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseLogConfig {
    /// JSONL file to append to; records are kept in memory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// Default value functions
fn default_window_start() -> NaiveTime {
    NaiveTime::from_hms_opt(10, 0, 0).unwrap_or_default()
}

fn default_window_end() -> NaiveTime {
    NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default()
}

const TIME_FORMAT: &str = "%H:%M:%S";

impl OmsConfig {
    /// Load configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> OmsResult<Self> {
        let config: OmsConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from YAML file
    pub fn load(path: impl AsRef<Path>) -> OmsResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            OmsError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Defaults overridden by `OMS_*` environment variables
    ///
    /// A `.env` file in the working directory is loaded first if present.
    pub fn from_env() -> OmsResult<Self> {
        dotenv::dotenv().ok();
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> OmsResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("OMS_WINDOW_START") {
            self.window.start = parse_time("OMS_WINDOW_START", &v)?;
        }
        if let Some(v) = lookup("OMS_WINDOW_END") {
            self.window.end = parse_time("OMS_WINDOW_END", &v)?;
        }
        if let Some(v) = lookup("OMS_RATE_LIMIT") {
            self.rate_limit.orders_per_second = v.trim().parse().map_err(|e| {
                OmsError::ConfigError(format!("Invalid OMS_RATE_LIMIT '{}': {}", v, e))
            })?;
        }
        if let Some(v) = lookup("OMS_RESPONSE_LOG") {
            let v = v.trim();
            self.response_log.path = if v.is_empty() {
                None
            } else {
                Some(PathBuf::from(v))
            };
        }
        Ok(())
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> OmsResult<()> {
        self.window.trading_window()?;

        if self.rate_limit.orders_per_second == 0 {
            return Err(OmsError::ConfigError(
                "rate_limit.orders_per_second must be positive".to_string(),
            ));
        }
        if self.dispatcher.idle_wait_ms == 0 {
            return Err(OmsError::ConfigError(
                "dispatcher.idle_wait_ms must be positive".to_string(),
            ));
        }

        let v = &self.validation;
        if !v.min_price.is_finite() || !v.max_price.is_finite() || v.min_price >= v.max_price {
            return Err(OmsError::ConfigError(format!(
                "Invalid price bounds ({}, {}]",
                v.min_price, v.max_price
            )));
        }
        if v.max_quantity == 0 {
            return Err(OmsError::ConfigError(
                "validation.max_quantity must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration as YAML
    pub fn to_yaml_string(&self) -> OmsResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn parse_time(key: &str, value: &str) -> OmsResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), TIME_FORMAT)
        .map_err(|e| OmsError::ConfigError(format!("Invalid {} '{}': {}", key, value, e)))
}
