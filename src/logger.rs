use serde_json::Value;
use std::sync::Arc;

use crate::builder::build_from_config;
use crate::config::{Config, ConfigError};
use crate::formatter::{EntryFormatter, ERROR_KEY};
use crate::identity::ProcessIdentity;
use crate::mapping::{apply_mapping, set_path, AttributeMapping, NamedFields};
use crate::record::{JsonObject, LogRecord};
use crate::sink::{LogSink, SinkError};

/// Full pipeline for one logger configuration: formatter, mapping and sink.
///
/// Everything inside is immutable after [`Logger::new`], so a single logger
/// can be shared between threads; only the sink serializes writes.
pub struct Logger {
    config: Arc<Config>,
    mapping: AttributeMapping,
    formatter: EntryFormatter,
    identity: Arc<dyn ProcessIdentity>,
    sink: Arc<dyn LogSink>,
}

impl Logger {
    /// Validate `config` and build its mapping. Misconfiguration is reported
    /// here, before any entry is formatted.
    pub fn new(config: Config, sink: Arc<dyn LogSink>) -> Result<Self, ConfigError> {
        let mapping = build_from_config(&config)?;
        let formatter = EntryFormatter::from_config(&config);
        let identity = config.identity();

        Ok(Logger {
            config: Arc::new(config),
            mapping,
            formatter,
            identity,
            sink,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mapping(&self) -> &AttributeMapping {
        &self.mapping
    }

    /// Turn a record into the document that would be written.
    ///
    /// An error logged as the message always reaches the output. It goes
    /// through the mapping when an `error` rule or the wildcard covers it,
    /// and is written at the root otherwise. A caller's own `error`
    /// attribute is mapped like any other attribute.
    pub fn render(&self, record: LogRecord) -> JsonObject {
        let formatted = self.formatter.format_parts(record.message, record.attributes);
        let mut attributes = formatted.attributes;
        let mut unmapped_error = None;
        if let Some(error) = formatted.injected_error {
            if self.mapping.has_wildcard() || self.mapping.rule(ERROR_KEY).is_some() {
                attributes.insert(ERROR_KEY.to_string(), error);
            } else {
                unmapped_error = Some(error);
            }
        }

        let fields = NamedFields {
            time: record.timestamp,
            severity: record.severity,
            message: formatted.message,
            progname: record.progname.or_else(|| self.config.logger_name.clone()),
            pid: record.process_id,
        };
        let mut entry = apply_mapping(&self.mapping, fields, attributes);

        if let Some(error) = unmapped_error {
            entry.insert(ERROR_KEY.to_string(), error);
        }

        if self.config.thread_name {
            set_path(
                &mut entry,
                &["logger".to_string(), "thread_name".to_string()],
                Value::String(self.identity.thread_name()),
            );
        }

        entry
    }

    /// Render `record` and hand it to the sink.
    pub fn log(&self, record: LogRecord) -> Result<(), SinkError> {
        let entry = self.render(record);
        self.sink.send(&entry)
    }

    pub fn flush(&self) -> Result<(), SinkError> {
        self.sink.flush()
    }
}
