use crate::config::{Config, ConfigError};
use crate::layer::DatadogJsonLayer;
use crate::logger::Logger;
use crate::sink::{JsonWriterSink, LogSink};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Subscriber assembly options.
///
/// **Fields**
/// - `enable_stderr`: if `true`, a `tracing_subscriber::fmt::Layer` writing
///   human-readable lines to stderr is installed next to the JSON layer.
#[derive(Clone, Debug, Default)]
pub struct LayerConfig {
    pub enable_stderr: bool,
}

/// Error type returned when installing the global subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("invalid logger configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("a global tracing subscriber is already installed")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Install a global `tracing` subscriber rendering events with `config`
/// into `sink`.
///
/// **Parameters**
/// - `config`: formatter [`Config`]; validated before anything is installed.
/// - `sink`: destination for rendered entries.
/// - `layer_config`: [`LayerConfig`] controlling the optional stderr echo.
///
/// **Returns**
/// - The [`Logger`] backing the layer, for direct use or flushing at exit.
pub fn init_tracing_with_config(
    config: Config,
    sink: Arc<dyn LogSink>,
    layer_config: LayerConfig,
) -> Result<Arc<Logger>, InitError> {
    let logger = Arc::new(Logger::new(config, sink)?);
    let layer = DatadogJsonLayer::new(Arc::clone(&logger));

    // The two variants have different subscriber types.
    if layer_config.enable_stderr {
        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(logger)
}

/// Install a global subscriber writing one JSON document per event to
/// stdout, honouring `config.pretty`.
pub fn init_tracing(config: Config) -> Result<Arc<Logger>, InitError> {
    let sink = JsonWriterSink::stdout().pretty(config.pretty);
    init_tracing_with_config(config, Arc::new(sink), LayerConfig::default())
}

/// [`init_tracing`] with settings read from the `DD_LOG_*` environment.
pub fn init_tracing_from_env() -> Result<Arc<Logger>, InitError> {
    init_tracing(Config::from_env()?)
}
