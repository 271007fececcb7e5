use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;
use crate::duration::{is_duration_attribute, normalize_duration, DURATION_KEY};
use crate::exception::{extract, BacktraceCleaner, ErrorLike};
use crate::record::{Attributes, FieldValue, JsonObject};

/// Attribute receiving an error that was logged as the message.
pub const ERROR_KEY: &str = "error";

/// Output of [`EntryFormatter::format_parts`].
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedEntry {
    pub message: Value,
    pub attributes: JsonObject,
    /// Expanded error taken from the message, if one was injected.
    pub injected_error: Option<Value>,
}

/// Rewrites a log call's message and attributes before mapping: errors are
/// expanded into structured objects and durations normalized to nanoseconds.
#[derive(Clone, Default)]
pub struct EntryFormatter {
    backtrace_cleaner: Option<Arc<dyn BacktraceCleaner>>,
    exception_attributes: BTreeMap<String, String>,
}

impl EntryFormatter {
    pub fn new(
        backtrace_cleaner: Option<Arc<dyn BacktraceCleaner>>,
        exception_attributes: BTreeMap<String, String>,
    ) -> Self {
        EntryFormatter {
            backtrace_cleaner,
            exception_attributes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.backtrace_cleaner.clone(), config.exception_attributes.clone())
    }

    /// Produce the message and attribute object handed to the mapper.
    ///
    /// An error logged as the message becomes its descriptive text and is
    /// moved to the `error` attribute, unless the caller already attached an
    /// error value or an `error` attribute of their own.
    pub fn format_entry(&self, message: FieldValue, attributes: Attributes) -> (Value, JsonObject) {
        let formatted = self.format_parts(message, attributes);
        match formatted.injected_error {
            Some(error) => {
                let mut output = Map::new();
                output.insert(ERROR_KEY.to_string(), error);
                output.extend(formatted.attributes);
                (formatted.message, output)
            }
            None => (formatted.message, formatted.attributes),
        }
    }

    /// Like [`EntryFormatter::format_entry`], but the `error` object built
    /// from an error message is kept apart from the caller's attributes.
    pub fn format_parts(&self, message: FieldValue, attributes: Attributes) -> FormattedEntry {
        let mut injected_error = None;

        let message = match message {
            FieldValue::Json(value) => value,
            FieldValue::Error(err) => {
                let caller_supplied = attributes.contains_key(ERROR_KEY)
                    || attributes.iter().any(|(_, value)| value.is_error());
                if !caller_supplied {
                    injected_error = Some(self.expand(err.as_ref()));
                }
                Value::String(err.describe())
            }
        };

        let mut output = Map::new();
        for (name, value) in attributes {
            match value {
                FieldValue::Error(err) => {
                    output.insert(name, self.expand(err.as_ref()));
                }
                FieldValue::Json(value) if is_duration_attribute(&name) => match normalize_duration(&name, &value) {
                    Some(nanos) => {
                        output.insert(DURATION_KEY.to_string(), nanos);
                    }
                    None => {
                        output.insert(name, value);
                    }
                },
                FieldValue::Json(value) => {
                    output.insert(name, value);
                }
            }
        }

        FormattedEntry {
            message,
            attributes: output,
            injected_error,
        }
    }

    fn expand(&self, err: &dyn ErrorLike) -> Value {
        extract(err, self.backtrace_cleaner.as_deref(), &self.exception_attributes).into_json()
    }
}
