use std::sync::Arc;

use crate::env::{EnvSource, LOG_SINK_ACCESS_TOKEN_ENV};
use crate::noop_sink::NoopSink;
use crate::resource;
use crate::sink::LogSink;
use crate::stdout_sink::StdoutSink;

/// Log id used when a DSN does not name one.
pub const DEFAULT_LOG_ID: &str = "app";

/// Supported sink kinds that can be selected via DSN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    /// Cloud Logging API. A missing project is taken from the environment
    /// when the sink is built.
    CloudLogging {
        project_id: Option<String>,
        log_id: String,
    },
    /// Structured JSON lines on stdout.
    Stdout,
    Noop,
}

/// High-level backend configuration built from a DSN.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Selected backend implementation.
    pub kind: BackendKind,
    /// Raw DSN that was used to construct this config.
    pub dsn: String,
}

impl BackendConfig {
    pub fn new(kind: BackendKind, dsn: impl Into<String>) -> Self {
        BackendConfig { kind, dsn: dsn.into() }
    }
}

/// Parse a DSN string and infer the backend kind from its scheme.
///
/// Examples:
/// - "cloudlogging://my-project/app"
/// - "cloudlogging:///requests" (project from the environment)
/// - "stdout://"
/// - "noop://"
pub fn parse_dsn(dsn: &str) -> Result<BackendConfig, DsnError> {
    let trimmed = dsn.trim();
    let (scheme, rest) = trimmed.split_once("://").ok_or(DsnError::UnknownScheme)?;

    let kind = match scheme.to_ascii_lowercase().as_str() {
        "cloudlogging" => {
            let (project, log_id) = rest.split_once('/').unwrap_or((rest, ""));
            let log_id = log_id.trim_matches('/');
            BackendKind::CloudLogging {
                project_id: (!project.is_empty()).then(|| project.to_string()),
                log_id: if log_id.is_empty() {
                    DEFAULT_LOG_ID.to_string()
                } else {
                    log_id.to_string()
                },
            }
        }
        "stdout" => BackendKind::Stdout,
        "noop" => BackendKind::Noop,
        _ => return Err(DsnError::UnknownScheme),
    };
    Ok(BackendConfig::new(kind, trimmed))
}

/// Error type returned when parsing a DSN.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DsnError {
    #[error("unknown or unsupported DSN scheme")]
    UnknownScheme,
}

/// Error type returned when building a sink from configuration.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BackendBuildError {
    #[error("http feature is not enabled")]
    HttpFeatureDisabled,

    #[error("no project id in the DSN or the environment")]
    MissingProject,
}

/// Create a concrete `LogSink` implementation from a `BackendConfig`.
///
/// `env` supplies the project id when the DSN leaves it out, and the
/// access token for the Cloud Logging API.
pub fn make_sink_from_config(
    cfg: &BackendConfig,
    env: &dyn EnvSource,
) -> Result<Arc<dyn LogSink>, BackendBuildError> {
    match &cfg.kind {
        BackendKind::CloudLogging { project_id, log_id } => {
            let project_id = project_id
                .clone()
                .or_else(|| resource::project_id(env))
                .ok_or(BackendBuildError::MissingProject)?;

            #[cfg(feature = "http")]
            {
                use crate::cloud_logging::{CloudLoggingConfig, CloudLoggingSink};

                let mut config = CloudLoggingConfig::new(project_id, log_id.clone());
                config.access_token = env.var(LOG_SINK_ACCESS_TOKEN_ENV);
                Ok(Arc::new(CloudLoggingSink::new(config)) as Arc<dyn LogSink>)
            }

            #[cfg(not(feature = "http"))]
            {
                let _ = (project_id, log_id, LOG_SINK_ACCESS_TOKEN_ENV);
                Err(BackendBuildError::HttpFeatureDisabled)
            }
        }
        BackendKind::Stdout => Ok(Arc::new(StdoutSink::new()) as Arc<dyn LogSink>),
        BackendKind::Noop => Ok(Arc::new(NoopSink) as Arc<dyn LogSink>),
    }
}
