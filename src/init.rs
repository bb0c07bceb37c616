use crate::backend::{self, BackendBuildError, BackendConfig, BackendKind, DsnError};
use crate::enrich::Enricher;
use crate::env::{self, ConfigError, EnvSource, ProcessEnv};
use crate::layer::CloudLoggingLayer;
use crate::resource::{self, ResourceResolver};
use crate::sink::LogSink;
use crate::transport::{BatchingTransport, TransportConfig, TransportError, TransportState};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

/// Конфигурация слоя логирования.
///
/// Управляет параметрами транспорта (очередь, батчи, flush, ретраи),
/// минимальным уровнем событий, которые уходят в sink, а также тем,
/// нужно ли дополнительно печатать логи в консоль через `fmt`‑слой.
///
/// **Поля**
/// - `transport`: [`TransportConfig`] фонового транспорта.
/// - `min_level`: события подробнее этого уровня игнорируются.
/// - `enable_stdout`: если `true`, поверх [`CloudLoggingLayer`]
///   добавляется `tracing_subscriber::fmt::Layer` (пишет в stderr,
///   фильтруется по `min_level`).
/// - `project_id`: явный project id; по умолчанию берётся из окружения.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub transport: TransportConfig,
    pub min_level: Level,
    pub enable_stdout: bool,
    pub project_id: Option<String>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            min_level: Level::INFO,
            enable_stdout: true,
            project_id: None,
        }
    }
}

impl LayerConfig {
    /// Defaults overridden by `LOG_SINK_*` variables in `env`.
    pub fn from_env(env: &dyn EnvSource) -> Result<Self, ConfigError> {
        let mut config = LayerConfig {
            transport: TransportConfig::from_env(env)?,
            ..Default::default()
        };
        if let Some(level) = env::parse_var::<Level>(env, env::LOG_SINK_LEVEL_ENV)? {
            config.min_level = level;
        }
        if let Some(enable) = env::parse_flag(env, env::LOG_SINK_STDOUT_ENV)? {
            config.enable_stdout = enable;
        }
        Ok(config)
    }
}

/// Errors from installing the logging pipeline.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dsn(#[from] DsnError),

    #[error(transparent)]
    Backend(#[from] BackendBuildError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to set global subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Keeps the pipeline's transport reachable for flushing at process exit.
///
/// Dropping the guard shuts the transport down (bounded by
/// `shutdown_timeout`); call [`CloudLoggingGuard::shutdown`] to observe
/// the outcome.
pub struct CloudLoggingGuard {
    transport: BatchingTransport,
}

impl CloudLoggingGuard {
    pub fn transport(&self) -> &BatchingTransport {
        &self.transport
    }

    pub fn flush(&self) -> Result<(), TransportError> {
        self.transport.flush()
    }

    pub fn shutdown(self) -> Result<(), TransportError> {
        self.transport.shutdown()
    }
}

impl Drop for CloudLoggingGuard {
    fn drop(&mut self) {
        if self.transport.state() == TransportState::Running {
            let _ = self.transport.shutdown();
        }
    }
}

/// Build the layer without installing it, for composing with other layers.
///
/// **Parameters**
/// - `sink`: implementation of [`LogSink`] that will receive batches of
///   enriched entries.
/// - `config`: [`LayerConfig`] controlling transport and filtering.
/// - `env`: environment used to resolve the monitored resource once.
pub fn build_layer(
    sink: Arc<dyn LogSink>,
    config: &LayerConfig,
    env: &dyn EnvSource,
) -> Result<CloudLoggingLayer, TransportError> {
    let project_id = config
        .project_id
        .clone()
        .or_else(|| resource::project_id(env));
    let enricher = Enricher::new(ResourceResolver::resolve(env), project_id);
    let transport = BatchingTransport::new(sink, config.transport.clone())?;
    Ok(CloudLoggingLayer::new(transport, enricher, config.min_level))
}

/// Initialize global `tracing` subscriber using the provided sink and
/// [`LayerConfig`].
///
/// **Parameters**
/// - `sink`: implementation of [`LogSink`] that will receive enriched
///   entries.
/// - `config`: [`LayerConfig`] controlling buffering, batching and
///   filtering.
///
/// **Effects**
///
/// Resolves the monitored resource from the process environment, starts
/// the transport worker and installs a [`Registry`] combined with
/// [`CloudLoggingLayer`] as the global default subscriber.
pub fn init_tracing_with_config(
    sink: Arc<dyn LogSink>,
    config: LayerConfig,
) -> Result<CloudLoggingGuard, InitError> {
    let layer = build_layer(sink, &config, &ProcessEnv)?;
    let guard = CloudLoggingGuard {
        transport: layer.transport().clone(),
    };

    // Слой, который пишет во внешний sink, подключается всегда.
    // При `enable_stdout = true` дополнительно подключаем `fmt`‑слой.
    // Для совместимости типов собираем subscriber в двух вариантах.
    if config.enable_stdout {
        // stdout остаётся за sink'ом (JSON-строки для агентов платформы).
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(LevelFilter::from_level(config.min_level));
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

/// Initialize tracing with sensible defaults.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`LayerConfig::default`].
pub fn init_tracing(sink: Arc<dyn LogSink>) -> Result<CloudLoggingGuard, InitError> {
    init_tracing_with_config(sink, LayerConfig::default())
}

/// Initialize tracing entirely from the process environment.
///
/// The sink comes from `LOG_SINK_DSN` (structured stdout when unset),
/// tuning from the other `LOG_SINK_*` variables.
pub fn init_from_env() -> Result<CloudLoggingGuard, InitError> {
    let env = ProcessEnv;
    let backend = backend_from_env(&env)?;
    let sink = backend::make_sink_from_config(&backend, &env)?;
    init_tracing_with_config(sink, layer_config_for(&backend, &env)?)
}

fn backend_from_env(env: &dyn EnvSource) -> Result<BackendConfig, DsnError> {
    backend::parse_dsn(&env::env_or(env, env::LOG_SINK_DSN_ENV, "stdout://"))
}

/// [`LayerConfig::from_env`], except that console mirroring is off by
/// default when the sink itself already writes to stdout.
fn layer_config_for(backend: &BackendConfig, env: &dyn EnvSource) -> Result<LayerConfig, ConfigError> {
    let mut config = LayerConfig::from_env(env)?;
    if backend.kind == BackendKind::Stdout && env.var(env::LOG_SINK_STDOUT_ENV).is_none() {
        config.enable_stdout = false;
    }
    Ok(config)
}
