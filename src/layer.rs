use chrono::Utc;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::exception::CapturedError;
use crate::logger::Logger;
use crate::record::{Attributes, FieldValue, LogRecord, Severity};

/// `tracing_subscriber` layer that renders every event through a [`Logger`].
///
/// Formatting and the sink write happen on the thread that emitted the
/// event. Level filtering is left to the subscriber stack (`EnvFilter`,
/// `LevelFilter`, ...).
pub struct DatadogJsonLayer {
    logger: Arc<Logger>,
    /// Total events seen by the layer.
    pub total_events: Arc<AtomicU64>,
    /// Events the sink rejected.
    pub failed_events: Arc<AtomicU64>,
}

impl DatadogJsonLayer {
    pub fn new(logger: Arc<Logger>) -> Self {
        DatadogJsonLayer {
            logger,
            total_events: Arc::new(AtomicU64::new(0)),
            failed_events: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    fn record_from_event(&self, event: &Event<'_>) -> LogRecord {
        let mut attributes = Attributes::new();
        let mut message: Option<FieldValue> = None;

        let mut visitor = FieldVisitor {
            attributes: &mut attributes,
            message: &mut message,
        };
        event.record(&mut visitor);

        let meta = event.metadata();
        // Without a configured logger name, the event target names the logger.
        let progname = match self.logger.config().logger_name {
            Some(_) => None,
            None => Some(meta.target().to_string()),
        };

        LogRecord {
            timestamp: Utc::now(),
            severity: Severity::from(*meta.level()),
            message: message.unwrap_or(FieldValue::Json(Value::String(String::new()))),
            progname,
            process_id: std::process::id(),
            attributes,
        }
    }
}

impl<S> Layer<S> for DatadogJsonLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let record = self.record_from_event(event);
        if let Err(e) = self.logger.log(record) {
            self.failed_events.fetch_add(1, Ordering::Relaxed);
            // Reporting through `tracing` would re-enter this layer.
            eprintln!("dropping log entry: {}", e);
        }
    }
}

/// Collects event fields into [`Attributes`], pulling out `message`.
pub struct FieldVisitor<'a> {
    pub attributes: &'a mut Attributes,
    pub message: &'a mut Option<FieldValue>,
}

impl<'a> FieldVisitor<'a> {
    fn put(&mut self, field: &Field, value: FieldValue) {
        if field.name() == "message" {
            *self.message = Some(value);
        } else {
            self.attributes.insert(field.name(), value);
        }
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, FieldValue::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, FieldValue::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, FieldValue::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, FieldValue::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, FieldValue::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, FieldValue::from(CapturedError::from_dyn(value)));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // Format strings arrive here as `fmt::Arguments`, whose Debug output
        // is the rendered text.
        self.put(field, FieldValue::from(format!("{:?}", value)));
    }
}
