use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use layers::PipelineTuning;
use runtime::BatchPlan;
use streaming::{ApiClient, DEFAULT_REQUEST_TIMEOUT, FetchError};
use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

impl Environment {
    pub fn default_api_base(&self) -> &'static str {
        match self {
            Environment::Dev => "http://127.0.0.1:8000",
            Environment::Prod => "https://visorpublicoemsvactualizado.khoraurbanthinkers.es/api_2",
        }
    }

    pub fn default_dataset_base(&self) -> &'static str {
        match self {
            Environment::Dev => "http://localhost:3040/api",
            Environment::Prod => "https://visorpublicoemsvactualizado.khoraurbanthinkers.es/api",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        })
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything a map session needs from its surroundings.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub environment: Environment,
    pub api_base: String,
    pub dataset_base: String,
    pub request_timeout: Duration,
    pub pipeline: PipelineTuning,
}

impl ViewerConfig {
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            environment,
            api_base: environment.default_api_base().to_string(),
            dataset_base: environment.default_dataset_base().to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            pipeline: PipelineTuning::default(),
        }
    }

    pub fn api_client(&self) -> Result<ApiClient, FetchError> {
        ApiClient::new(&self.api_base, &self.dataset_base, self.request_timeout)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from a key lookup, so tests need not touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = parse_var(&lookup, "EMSV_ENV", Environment::Dev)?;
        let mut config = Self::for_environment(environment);

        if let Some(base) = non_empty(&lookup, "EMSV_API_BASE") {
            config.api_base = base;
        }
        if let Some(base) = non_empty(&lookup, "EMSV_DATASET_BASE") {
            config.dataset_base = base;
        }

        let timeout_ms = parse_var(
            &lookup,
            "EMSV_REQUEST_TIMEOUT_MS",
            config.request_timeout.as_millis() as u64,
        )?;
        config.request_timeout = Duration::from_millis(timeout_ms);

        let defaults = config.pipeline;
        let batch_size = parse_var(&lookup, "EMSV_BATCH_SIZE", defaults.batch.size())?;
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "EMSV_BATCH_SIZE",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let batch_delay_ms = parse_var(
            &lookup,
            "EMSV_BATCH_DELAY_MS",
            defaults.batch.delay().as_millis() as u64,
        )?;
        let debounce_ms = parse_var(
            &lookup,
            "EMSV_DEBOUNCE_MS",
            defaults.debounce.as_millis() as u64,
        )?;
        config.pipeline = PipelineTuning {
            batch: BatchPlan::new(batch_size, Duration::from_millis(batch_delay_ms)),
            debounce: Duration::from_millis(debounce_ms),
            ..defaults
        };
        Ok(config)
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Dev)
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match non_empty(lookup, key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}
