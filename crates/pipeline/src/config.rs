use std::str::FromStr;
use std::time::Duration;

use ctlens_core::error::CoreError;
use ctlens_core::store::DEFAULT_STORE_CAPACITY;

/// Configuration error raised while reading environment variables.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a valid {expected} (got {value:?})")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

/// Pipeline configuration: remote service locations, polling cadence,
/// retry bounds, and cache sizes.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base URL of the compression service.
    pub compressor_url: String,
    /// Full URL of the inference analysis endpoint.
    pub inference_url: String,
    /// Delay between two polls of the same job.
    pub poll_interval: Duration,
    /// Consecutive materialization failures tolerated before the job
    /// moves to `error`.
    pub max_materialize_attempts: u32,
    /// Wall-clock ceiling of one analysis session.
    pub analysis_timeout: Duration,
    pub payload_cache_capacity: usize,
    pub result_cache_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            compressor_url: "http://localhost:8000".into(),
            inference_url: "http://localhost:8001/analyze".into(),
            poll_interval: Duration::from_millis(2500),
            max_materialize_attempts: 10,
            analysis_timeout: Duration::from_secs(60),
            payload_cache_capacity: DEFAULT_STORE_CAPACITY,
            result_cache_capacity: DEFAULT_STORE_CAPACITY,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                          |
    /// |----------------------------|----------------------------------|
    /// | `COMPRESSOR_URL`           | `http://localhost:8000`          |
    /// | `INFERENCE_URL`            | `http://localhost:8001/analyze`  |
    /// | `POLL_INTERVAL_MS`         | `2500`                           |
    /// | `MAX_MATERIALIZE_ATTEMPTS` | `10`                             |
    /// | `ANALYSIS_TIMEOUT_SECS`    | `60`                             |
    /// | `PAYLOAD_CACHE_CAPACITY`   | `64`                             |
    /// | `RESULT_CACHE_CAPACITY`    | `64`                             |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let poll_interval_ms = parse_var(&lookup, "POLL_INTERVAL_MS", 2500u64, "u64")?;
        if poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                var: "POLL_INTERVAL_MS",
                value: poll_interval_ms.to_string(),
                expected: "non-zero u64",
            });
        }

        Ok(Self {
            compressor_url: lookup("COMPRESSOR_URL").unwrap_or(defaults.compressor_url),
            inference_url: lookup("INFERENCE_URL").unwrap_or(defaults.inference_url),
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_materialize_attempts: parse_var(
                &lookup,
                "MAX_MATERIALIZE_ATTEMPTS",
                defaults.max_materialize_attempts,
                "u32",
            )?,
            analysis_timeout: Duration::from_secs(parse_var(
                &lookup,
                "ANALYSIS_TIMEOUT_SECS",
                60u64,
                "u64",
            )?),
            payload_cache_capacity: parse_var(
                &lookup,
                "PAYLOAD_CACHE_CAPACITY",
                defaults.payload_cache_capacity,
                "usize",
            )?,
            result_cache_capacity: parse_var(
                &lookup,
                "RESULT_CACHE_CAPACITY",
                defaults.result_cache_capacity,
                "usize",
            )?,
        })
    }
}

/// Parse variable `var` through `lookup`, falling back to `default` when
/// it is unset.
pub fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            value,
            expected,
        }),
    }
}
