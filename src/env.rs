//! Environment variable names consumed by this crate and a small
//! abstraction over where they are read from.
//!
//! Resource detection and configuration take an [`EnvSource`] instead of
//! calling `std::env` directly, so both can be exercised against an
//! in-memory map.

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

/// Project id, set by most serverless runtimes.
pub const GOOGLE_CLOUD_PROJECT_ENV: &str = "GOOGLE_CLOUD_PROJECT";

/// Legacy project id variable (App Engine flexible).
pub const GCLOUD_PROJECT_ENV: &str = "GCLOUD_PROJECT";

/// App Engine service name.
pub const GAE_SERVICE_ENV: &str = "GAE_SERVICE";

/// App Engine version id.
pub const GAE_VERSION_ENV: &str = "GAE_VERSION";

/// App Engine zone. Not set by every runtime generation.
pub const GAE_ZONE_ENV: &str = "GAE_ZONE";

/// Knative service name (Cloud Run, Cloud Functions gen2).
pub const K_SERVICE_ENV: &str = "K_SERVICE";

/// Knative revision name.
pub const K_REVISION_ENV: &str = "K_REVISION";

/// Knative configuration name.
pub const K_CONFIGURATION_ENV: &str = "K_CONFIGURATION";

/// Cloud Run region, normally injected by the deployment.
pub const CLOUD_RUN_LOCATION_ENV: &str = "CLOUD_RUN_LOCATION";

/// Entry point of a Cloud Function.
pub const FUNCTION_TARGET_ENV: &str = "FUNCTION_TARGET";

/// Cloud Functions gen1 function name.
pub const FUNCTION_NAME_ENV: &str = "FUNCTION_NAME";

/// Cloud Functions gen1 region.
pub const FUNCTION_REGION_ENV: &str = "FUNCTION_REGION";

/// Present in every Kubernetes pod.
pub const KUBERNETES_SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";

/// Cluster location (zone or region), via the downward API or deployment.
pub const CLUSTER_LOCATION_ENV: &str = "CLUSTER_LOCATION";

/// Cluster name.
pub const CLUSTER_NAME_ENV: &str = "CLUSTER_NAME";

/// Pod namespace, via the downward API.
pub const POD_NAMESPACE_ENV: &str = "POD_NAMESPACE";

/// Pod name; Kubernetes sets the hostname to it.
pub const HOSTNAME_ENV: &str = "HOSTNAME";

/// Container name, via the deployment.
pub const CONTAINER_NAME_ENV: &str = "CONTAINER_NAME";

/// Sink DSN, see [`crate::backend::parse_dsn`].
pub const LOG_SINK_DSN_ENV: &str = "LOG_SINK_DSN";

/// Bearer token for the Cloud Logging API.
pub const LOG_SINK_ACCESS_TOKEN_ENV: &str = "LOG_SINK_ACCESS_TOKEN";

/// Capacity of the intake queue.
pub const LOG_SINK_QUEUE_SIZE_ENV: &str = "LOG_SINK_QUEUE_SIZE";

/// Maximum entries per delivered batch.
pub const LOG_SINK_BATCH_SIZE_ENV: &str = "LOG_SINK_BATCH_SIZE";

/// Periodic flush interval in milliseconds.
pub const LOG_SINK_FLUSH_INTERVAL_MS_ENV: &str = "LOG_SINK_FLUSH_INTERVAL_MS";

/// Queue depth that triggers an early flush.
pub const LOG_SINK_HIGH_WATERMARK_ENV: &str = "LOG_SINK_HIGH_WATERMARK";

/// Delivery retries per batch.
pub const LOG_SINK_MAX_RETRIES_ENV: &str = "LOG_SINK_MAX_RETRIES";

/// Upper bound for the final flush on shutdown, in milliseconds.
pub const LOG_SINK_SHUTDOWN_TIMEOUT_MS_ENV: &str = "LOG_SINK_SHUTDOWN_TIMEOUT_MS";

/// Minimum level captured by the layer (`trace`..`error`).
pub const LOG_SINK_LEVEL_ENV: &str = "LOG_SINK_LEVEL";

/// Whether events are mirrored to the console (`true`/`false`).
pub const LOG_SINK_STDOUT_ENV: &str = "LOG_SINK_STDOUT";

/// Read-only view of environment variables.
pub trait EnvSource {
    /// Value of `key`, or `None` if unset. Empty values count as unset.
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.is_empty()).cloned()
    }
}

impl EnvSource for HashMap<&str, &str> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    }
}

/// A configuration variable is set to something unusable.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Parse `key` if it is set.
pub fn parse_var<T>(env: &dyn EnvSource, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env.var(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
                value,
            }),
    }
}

/// Parse a boolean flag; accepts `1/0`, `true/false`, `yes/no`, `on/off`.
pub fn parse_flag(env: &dyn EnvSource, key: &str) -> Result<Option<bool>, ConfigError> {
    let Some(value) = env.var(key) else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value,
            reason: "expected a boolean".to_string(),
        }),
    }
}

/// Read an environment variable or fall back to a provided default.
pub fn env_or(env: &dyn EnvSource, key: &str, default: &str) -> String {
    env.var(key).unwrap_or_else(|| default.to_string())
}
