//! Loads a YAML [`SyncConfig`] and applies environment overrides.
//!
//! Accepted YAML (every key optional):
//!
//! ```yaml
//! dry_run: false
//! diff_output: ./diff.json
//! executor:
//!   max_concurrency: 4
//!   min_call_interval_ms: 200
//!   continue_on_failure: true
//! ```
//!
//! After parsing, `SYNCLY_DRY_RUN`, `SYNCLY_MAX_CONCURRENCY` and
//! `SYNCLY_MIN_CALL_INTERVAL_MS` override the file. A `.env` file in the
//! working directory is read first if present.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use tracing::{error, info};

use crate::config::SyncConfig;
use crate::error::ConfigError;

pub const ENV_DRY_RUN: &str = "SYNCLY_DRY_RUN";
pub const ENV_MAX_CONCURRENCY: &str = "SYNCLY_MAX_CONCURRENCY";
pub const ENV_MIN_CALL_INTERVAL_MS: &str = "SYNCLY_MIN_CALL_INTERVAL_MS";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SyncConfig, ConfigError> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(ConfigError::Read {
                path: path_ref.display().to_string(),
                source: e,
            });
        }
    };

    let mut config = parse_config(&content)?;
    dotenvy::dotenv().ok();
    apply_env_overrides(&mut config)?;
    config.trace_loaded();
    Ok(config)
}

/// Parses YAML content; an empty document yields the defaults.
pub fn parse_config(content: &str) -> Result<SyncConfig, ConfigError> {
    if content.trim().is_empty() {
        return Ok(SyncConfig::default());
    }
    serde_yaml::from_str(content).map_err(|e| {
        error!(error = ?e, "Failed to parse config YAML");
        ConfigError::Parse(e)
    })
}

pub fn apply_env_overrides(config: &mut SyncConfig) -> Result<(), ConfigError> {
    if let Some(dry_run) = env_value::<bool>(ENV_DRY_RUN)? {
        config.dry_run = dry_run;
    }
    if let Some(max) = env_value::<usize>(ENV_MAX_CONCURRENCY)? {
        if max == 0 {
            return Err(ConfigError::InvalidEnv {
                var: ENV_MAX_CONCURRENCY.to_string(),
                value: max.to_string(),
            });
        }
        config.executor.max_concurrency = max;
    }
    if let Some(interval) = env_value::<u64>(ENV_MIN_CALL_INTERVAL_MS)? {
        config.executor.min_call_interval_ms = interval;
    }
    Ok(())
}

fn env_value<T: FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            error!(var, value = %raw, "Invalid environment override");
            ConfigError::InvalidEnv {
                var: var.to_string(),
                value: raw,
            }
        }),
        Err(_) => Ok(None),
    }
}
