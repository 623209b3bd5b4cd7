//! Settings for the `admission-gate` server, read from the environment.
//!
//! Values come from an optional `.env` file in the working directory, overridden by process
//! environment variables. A value that cannot be parsed is reported and the default kept, so a
//! typo never stops the service from starting.

use crate::engine::DEFAULT_STORE_TIMEOUT;
use crate::policy::{DimensionPolicy, Policy};
use crate::store::redis::RedisSettings;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Settings {
    pub policy: Policy,
    pub redis: RedisSettings,
    pub store_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            redis: RedisSettings::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let source = Config::builder()
            .add_source(File::new(".env", FileFormat::Ini).required(false))
            .add_source(Environment::default())
            .build()?;
        Ok(Self::from_config(&source))
    }

    /// Read settings from an already assembled source; keys are the lower cased variable names.
    pub fn from_config(source: &Config) -> Self {
        let mut settings = Self::default();
        read_dimension(source, "ip", &mut settings.policy.address);
        read_dimension(source, "token", &mut settings.policy.token);

        let mut timeout_ms = u64::try_from(settings.store_timeout.as_millis()).unwrap_or(u64::MAX);
        read_positive(source, "rate_limiter_store_timeout_ms", &mut timeout_ms);
        settings.store_timeout = Duration::from_millis(timeout_ms);

        read(source, "redis_addr", &mut settings.redis.address);
        read(source, "redis_db", &mut settings.redis.database);
        match source.get_string("redis_pass") {
            Ok(password) if !password.is_empty() => {
                log::debug!("Configuration loaded: REDIS_PASS=***");
                settings.redis.password = Some(password);
            }
            Ok(_) | Err(ConfigError::NotFound(_)) => {}
            Err(e) => log::warn!("Invalid value for REDIS_PASS: {e}"),
        }

        log::info!(
            "Configuration loaded: ip limit enabled={}, token limit enabled={}",
            settings.policy.address.enabled,
            settings.policy.token.enabled
        );
        settings
    }
}

fn read_dimension(source: &Config, suffix: &str, target: &mut DimensionPolicy) {
    read_flag(
        source,
        &format!("rate_limiter_enable_{suffix}"),
        &mut target.enabled,
    );
    read_positive(
        source,
        &format!("rate_limiter_max_requests_{suffix}"),
        &mut target.max_requests,
    );
    read(
        source,
        &format!("rate_limiter_block_duration_{suffix}"),
        &mut target.block_seconds,
    );
}

fn read<T: DeserializeOwned + Display>(source: &Config, key: &str, target: &mut T) {
    match source.get::<T>(key) {
        Ok(value) => {
            log::debug!("Configuration loaded: {}={value}", key.to_uppercase());
            *target = value;
        }
        Err(ConfigError::NotFound(_)) => {}
        Err(e) => log::warn!(
            "Invalid value for {}: {e}, keeping {target}",
            key.to_uppercase()
        ),
    }
}

/// Any value other than exactly `true` switches the flag off.
fn read_flag(source: &Config, key: &str, target: &mut bool) {
    match source.get_string(key) {
        Ok(value) => {
            *target = value == "true";
            log::debug!("Configuration loaded: {}={target}", key.to_uppercase());
        }
        Err(ConfigError::NotFound(_)) => {}
        Err(e) => log::warn!(
            "Invalid value for {}: {e}, keeping {target}",
            key.to_uppercase()
        ),
    }
}

fn read_positive(source: &Config, key: &str, target: &mut u64) {
    let mut value = *target;
    read(source, key, &mut value);
    if value == 0 {
        log::warn!("{} must be positive, keeping {target}", key.to_uppercase());
    } else {
        *target = value;
    }
}
