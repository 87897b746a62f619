use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::CoinMarketCapConfig;
use crate::error::ConfigError;
use crate::execution::{DriverConfig, EngineConfig};
use crate::forecast::LinearTrendForecaster;

/// Looked up when no `--config` path is given; missing is fine
pub const DEFAULT_CONFIG_FILE: &str = "config/forecastbot";
pub const ENV_PREFIX: &str = "FORECASTBOT";
pub const API_KEY_ENV: &str = "COINMARKETCAP_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub account: AccountSettings,
    pub driver: DriverSettings,
    pub price_source: CoinMarketCapConfig,
    pub forecast: ForecastSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AccountSettings {
    pub initial_balance: f64,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            initial_balance: 1_000_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriverSettings {
    pub interval_secs: u64,
    pub max_ticks: Option<u64>,
    /// Ledger report written here when the run ends
    pub report_path: Option<PathBuf>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            max_ticks: None,
            report_path: None,
        }
    }
}

impl DriverSettings {
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            interval: Duration::from_secs(self.interval_secs),
            max_ticks: self.max_ticks,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForecastSettings {
    /// Daily CSV, local path or http(s) URL
    pub history_uri: String,
    pub train_fraction: f64,
    pub lookback_days: usize,
    pub horizon_days: u32,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            history_uri: "data/BTC-USD.csv".to_string(),
            train_fraction: 0.85,
            lookback_days: 30,
            horizon_days: 1,
        }
    }
}

impl ForecastSettings {
    pub fn forecaster(&self) -> LinearTrendForecaster {
        LinearTrendForecaster::new(self.lookback_days, self.horizon_days)
    }
}

impl Settings {
    /// Defaults, then the config file, then `FORECASTBOT__SECTION__KEY` variables
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true);

        let mut settings = Self::from_sources(path, env)?;

        if settings.price_source.api_key.is_none() {
            settings.price_source.api_key = std::env::var(API_KEY_ENV).ok();
        }

        settings.validate()?;
        Ok(settings)
    }

    fn from_sources(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;

        let balance = self.account.initial_balance;
        if !(balance.is_finite() && balance >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "account.initial_balance must be non-negative, got {}",
                balance
            )));
        }
        if self.driver.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "driver.interval_secs must be at least 1".to_string(),
            ));
        }
        if self.price_source.requests_per_minute == 0 {
            return Err(ConfigError::Invalid(
                "price_source.requests_per_minute must be at least 1".to_string(),
            ));
        }

        let forecast = &self.forecast;
        if !(forecast.train_fraction > 0.0 && forecast.train_fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "forecast.train_fraction must be in (0, 1], got {}",
                forecast.train_fraction
            )));
        }
        if forecast.lookback_days < 2 {
            return Err(ConfigError::Invalid(format!(
                "forecast.lookback_days must be at least 2, got {}",
                forecast.lookback_days
            )));
        }
        if forecast.horizon_days == 0 {
            return Err(ConfigError::Invalid(
                "forecast.horizon_days must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
