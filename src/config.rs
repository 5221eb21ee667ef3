use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub run_address: String,
    pub database_uri: String,
    pub accrual_system_address: String,
    pub accrual_poll_interval_secs: u64,
    pub accrual_worker_pool_size: usize,
    pub accrual_request_timeout_secs: u64,
    pub database_max_connections: u32,
    pub api_rate_limit_per_minute: u32,
}

impl Config {
    /// Load from the process environment (`.env` is read by `main` beforehand).
    pub fn from_env() -> AppResult<Self> {
        Self::from_source(config::Environment::default().try_parsing(true))
    }

    fn from_source<S>(source: S) -> AppResult<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config: Config = config::Config::builder()
            .set_default("run_address", "0.0.0.0:8181")?
            .set_default("database_uri", "postgres://localhost/rewards")?
            .set_default("accrual_system_address", "http://localhost:8123")?
            .set_default("accrual_poll_interval_secs", 10)?
            .set_default("accrual_worker_pool_size", 8)?
            .set_default("accrual_request_timeout_secs", 20)?
            .set_default("database_max_connections", 20)?
            .set_default("api_rate_limit_per_minute", 600)?
            .add_source(source)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.accrual_poll_interval_secs == 0 {
            return Err(AppError::Config(
                "ACCRUAL_POLL_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }
        if self.accrual_worker_pool_size == 0 {
            return Err(AppError::Config(
                "ACCRUAL_WORKER_POOL_SIZE must be greater than zero".to_string(),
            ));
        }
        if self.accrual_request_timeout_secs == 0 {
            return Err(AppError::Config(
                "ACCRUAL_REQUEST_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        if self.database_max_connections == 0 {
            return Err(AppError::Config(
                "DATABASE_MAX_CONNECTIONS must be greater than zero".to_string(),
            ));
        }
        if reqwest::Url::parse(&self.accrual_system_address).is_err() {
            return Err(AppError::Config(format!(
                "ACCRUAL_SYSTEM_ADDRESS is not a valid URL: {}",
                self.accrual_system_address
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.accrual_poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.accrual_request_timeout_secs)
    }
}

/// Replace the password component of a connection string, if any.
fn mask_password(dsn: &str) -> String {
    match reqwest::Url::parse(dsn) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("*******")).is_ok() {
                url.to_string()
            } else {
                dsn.to_string()
            }
        }
        _ => dsn.to_string(),
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_address={}, database_uri={}, accrual_system_address={}, poll_interval={}s, workers={}",
            self.run_address,
            mask_password(&self.database_uri),
            self.accrual_system_address,
            self.accrual_poll_interval_secs,
            self.accrual_worker_pool_size,
        )
    }
}
