use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::forecast::{ForecastHorizon, SeasonalityConfig};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;
pub const DEFAULT_PRODUCT_COUNT: usize = 10;
pub const DEFAULT_PRODUCT_NAME_CHARS: usize = 30;
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;
pub const DEFAULT_MAX_SESSIONS: usize = 32;

pub const ENV_CONFIG: &str = "RETAILSCOPE_CONFIG";
pub const ENV_BIND: &str = "RETAILSCOPE_BIND";
pub const ENV_MAX_UPLOAD_BYTES: &str = "RETAILSCOPE_MAX_UPLOAD_BYTES";
pub const ENV_FORECAST_TIMEOUT_SECS: &str = "RETAILSCOPE_FORECAST_TIMEOUT_SECS";
pub const ENV_FORECAST_ENABLED: &str = "RETAILSCOPE_FORECAST_ENABLED";
pub const ENV_SESSION_IDLE_SECS: &str = "RETAILSCOPE_SESSION_IDLE_SECS";
pub const ENV_MAX_SESSIONS: &str = "RETAILSCOPE_MAX_SESSIONS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub bind_address: String,
    pub max_upload_bytes: usize,
    pub forecast: ForecastConfig,
    pub products: ProductConfig,
    pub sessions: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub enabled: bool,
    pub timeout_secs: u64,
    pub default_horizon_days: u32,
    pub seasonality: SeasonalityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductConfig {
    pub default_count: usize,
    pub max_name_chars: usize,
}

/// Limits on the uploaded datasets the server keeps in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// A session untouched for this long is dropped.
    pub idle_secs: u64,
    /// Creating a session beyond this count drops the least recently used one.
    pub max_sessions: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            forecast: ForecastConfig::default(),
            products: ProductConfig::default(),
            sessions: SessionConfig::default(),
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 30,
            default_horizon_days: ForecastHorizon::DEFAULT_DAYS,
            seasonality: SeasonalityConfig::default(),
        }
    }
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self {
            default_count: DEFAULT_PRODUCT_COUNT,
            max_name_chars: DEFAULT_PRODUCT_NAME_CHARS,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_secs: DEFAULT_SESSION_IDLE_SECS,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }
}

impl ForecastConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DashboardConfig {
    /// Reads an optional TOML file, then applies `RETAILSCOPE_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                let config = Self::from_toml_str(&raw)?;
                debug!(path = %path.display(), "loaded configuration file");
                config
            }
            None => Self::default(),
        };

        base.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|err| PipelineError::Config(format!("invalid TOML: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup(ENV_BIND) {
            self.bind_address = bind;
        }
        if let Some(raw) = lookup(ENV_MAX_UPLOAD_BYTES) {
            self.max_upload_bytes = parse_env(ENV_MAX_UPLOAD_BYTES, &raw)?;
        }
        if let Some(raw) = lookup(ENV_FORECAST_TIMEOUT_SECS) {
            self.forecast.timeout_secs = parse_env(ENV_FORECAST_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_FORECAST_ENABLED) {
            self.forecast.enabled = parse_env(ENV_FORECAST_ENABLED, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SESSION_IDLE_SECS) {
            self.sessions.idle_secs = parse_env(ENV_SESSION_IDLE_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_SESSIONS) {
            self.sessions.max_sessions = parse_env(ENV_MAX_SESSIONS, &raw)?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(PipelineError::Config(
                "max_upload_bytes must be greater than zero".to_string(),
            ));
        }
        if self.forecast.timeout_secs == 0 {
            return Err(PipelineError::Config(
                "forecast.timeout_secs must be greater than zero".to_string(),
            ));
        }
        ForecastHorizon::new(self.forecast.default_horizon_days)
            .map_err(|err| PipelineError::Config(format!("forecast.default_horizon_days: {err}")))?;
        if self.products.default_count == 0 {
            return Err(PipelineError::Config(
                "products.default_count must be greater than zero".to_string(),
            ));
        }
        if self.products.max_name_chars == 0 {
            return Err(PipelineError::Config(
                "products.max_name_chars must be greater than zero".to_string(),
            ));
        }
        if self.sessions.idle_secs == 0 {
            return Err(PipelineError::Config(
                "sessions.idle_secs must be greater than zero".to_string(),
            ));
        }
        if self.sessions.max_sessions == 0 {
            return Err(PipelineError::Config(
                "sessions.max_sessions must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|err| PipelineError::Config(format!("{key}={raw:?}: {err}")))
}
