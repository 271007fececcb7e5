use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::exception::{CapturedError, ErrorLike};

/// Log severity as understood by the formatter.
///
/// Rendered upper-case under the `status` key by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
            Severity::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE | tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::INFO => Severity::Info,
            tracing::Level::WARN => Severity::Warn,
            tracing::Level::ERROR => Severity::Error,
        }
    }
}

/// A message or attribute value attached to a log call.
///
/// Error values are kept apart from plain data so the formatter can expand
/// them into `kind`/`message`/`stack` objects instead of guessing from shape.
#[derive(Clone)]
pub enum FieldValue {
    Json(Value),
    Error(Arc<dyn ErrorLike>),
}

impl FieldValue {
    pub fn error(err: impl ErrorLike + 'static) -> Self {
        FieldValue::Error(Arc::new(err))
    }

    pub fn as_error(&self) -> Option<&Arc<dyn ErrorLike>> {
        match self {
            FieldValue::Error(err) => Some(err),
            FieldValue::Json(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FieldValue::Error(_))
    }

    /// Human-readable rendering used when a value has to become text.
    pub fn describe(&self) -> String {
        match self {
            FieldValue::Json(value) => describe_json(value),
            FieldValue::Error(err) => err.describe(),
        }
    }
}

/// Strings render as themselves, everything else as its JSON text.
pub fn describe_json(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Json(value) => f.debug_tuple("Json").field(value).finish(),
            FieldValue::Error(err) => f.debug_tuple("Error").field(&err.describe()).finish(),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Json(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Json(Value::String(value.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Json(Value::String(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Json(Value::Bool(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Json(Value::from(value))
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Json(Value::from(value))
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Json(Value::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Json(Value::from(value))
    }
}

impl From<CapturedError> for FieldValue {
    fn from(err: CapturedError) -> Self {
        FieldValue::Error(Arc::new(err))
    }
}

impl From<Arc<dyn ErrorLike>> for FieldValue {
    fn from(err: Arc<dyn ErrorLike>) -> Self {
        FieldValue::Error(err)
    }
}

/// Caller-supplied attributes, kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    entries: Vec<(String, FieldValue)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an attribute. Replacing keeps the original position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder-style [`Attributes::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl IntoIterator for Attributes {
    type Item = (String, FieldValue);
    type IntoIter = std::vec::IntoIter<(String, FieldValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (k, v) in iter {
            attrs.insert(k, v);
        }
        attrs
    }
}

/// One log call as seen by the formatting pipeline.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: FieldValue,
    pub progname: Option<String>,
    pub process_id: u32,
    pub attributes: Attributes,
}

impl LogRecord {
    /// Record stamped with the current time and this process's id.
    pub fn new(severity: Severity, message: impl Into<FieldValue>) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            severity,
            message: message.into(),
            progname: None,
            process_id: std::process::id(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_progname(mut self, progname: impl Into<String>) -> Self {
        self.progname = Some(progname.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.attributes.insert(name, value);
        self
    }
}

/// Output object type produced by the mapper.
pub type JsonObject = Map<String, Value>;
