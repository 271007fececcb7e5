use serde::Serialize;
use serde_json::{Map, Value};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

/// Anything the formatter can expand into an `error`-style object.
///
/// Implemented by [`CapturedError`]; applications with richer error types can
/// implement it directly to expose extra accessors through [`ErrorLike::attribute`].
pub trait ErrorLike: Send + Sync {
    /// Type name reported under `kind`.
    fn kind(&self) -> String;

    fn message(&self) -> String;

    /// Backtrace lines, outermost frame first. `None` when not captured.
    fn backtrace(&self) -> Option<Vec<String>> {
        None
    }

    /// Look up a named accessor on the error. Unknown names yield `None`.
    fn attribute(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Text used when the error stands in for a log message.
    fn describe(&self) -> String {
        format!("{}: {}", self.kind(), self.message())
    }
}

/// Filters or shortens backtrace lines before they are emitted.
pub trait BacktraceCleaner: Send + Sync {
    fn clean(&self, lines: Vec<String>) -> Vec<String>;
}

impl<F> BacktraceCleaner for F
where
    F: Fn(Vec<String>) -> Vec<String> + Send + Sync,
{
    fn clean(&self, lines: Vec<String>) -> Vec<String> {
        self(lines)
    }
}

/// Drops every backtrace line containing one of the configured patterns.
#[derive(Debug, Clone, Default)]
pub struct SilencingCleaner {
    silenced: Vec<String>,
}

impl SilencingCleaner {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SilencingCleaner {
            silenced: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

impl BacktraceCleaner for SilencingCleaner {
    fn clean(&self, lines: Vec<String>) -> Vec<String> {
        lines
            .into_iter()
            .filter(|line| !self.silenced.iter().any(|p| line.contains(p.as_str())))
            .collect()
    }
}

/// Structured form of an error, serialized as
/// `{"kind": .., "message": .., "stack": [..], <extra>..}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptionAttributes {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExceptionAttributes {
    /// JSON object form. Falls back to `kind`/`message` only if the extras
    /// cannot be flattened into a map.
    pub fn into_json(self) -> Value {
        match serde_json::to_value(&self) {
            Ok(value) => value,
            Err(_) => serde_json::json!({"kind": self.kind, "message": self.message}),
        }
    }
}

/// Expand `error` into its structured attributes.
///
/// `additional` maps output keys to accessor names looked up through
/// [`ErrorLike::attribute`]; missing accessors are skipped.
pub fn extract(
    error: &dyn ErrorLike,
    cleaner: Option<&dyn BacktraceCleaner>,
    additional: &BTreeMap<String, String>,
) -> ExceptionAttributes {
    let stack = error
        .backtrace()
        .filter(|lines| !lines.is_empty())
        .map(|lines| match cleaner {
            Some(cleaner) => cleaner.clean(lines),
            None => lines,
        });

    let mut extra = Map::new();
    for (key, accessor) in additional {
        if let Some(value) = error.attribute(accessor) {
            extra.insert(key.clone(), value);
        }
    }

    ExceptionAttributes {
        kind: error.kind(),
        message: error.message(),
        stack,
        extra,
    }
}

/// Owned snapshot of an error: kind, message, optional backtrace and a bag
/// of named accessors.
#[derive(Clone, PartialEq)]
pub struct CapturedError {
    kind: String,
    message: String,
    backtrace: Option<Vec<String>>,
    attributes: BTreeMap<String, Value>,
}

impl CapturedError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        CapturedError {
            kind: kind.into(),
            message: message.into(),
            backtrace: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Snapshot a concrete error type. The kind is the type's short name and
    /// a backtrace is captured when `RUST_BACKTRACE`/`RUST_LIB_BACKTRACE`
    /// enables it.
    pub fn from_error<E: Error + ?Sized>(err: &E) -> Self
    where
        E: 'static,
    {
        let mut captured = CapturedError::new(short_type_name(std::any::type_name::<E>()), err.to_string());
        captured.capture_backtrace();
        captured.record_source(err.source());
        captured
    }

    /// Snapshot a type-erased error. The kind is recovered from the leading
    /// identifier of its `Debug` output.
    pub fn from_dyn(err: &(dyn Error + 'static)) -> Self {
        let debug = format!("{:?}", err);
        let kind = leading_identifier(&debug).unwrap_or("Error");
        let mut captured = CapturedError::new(kind, err.to_string());
        captured.capture_backtrace();
        captured.record_source(err.source());
        captured
    }

    pub fn with_backtrace<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backtrace = Some(lines.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    fn capture_backtrace(&mut self) {
        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            let lines: Vec<String> = backtrace
                .to_string()
                .lines()
                .map(|line| line.trim().to_string())
                .filter(|line| !line.is_empty())
                .collect();
            self.backtrace = Some(lines);
        }
    }

    fn record_source(&mut self, source: Option<&(dyn Error + 'static)>) {
        if let Some(source) = source {
            self.attributes
                .insert("source".to_string(), Value::String(source.to_string()));
        }
    }
}

impl fmt::Debug for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("has_backtrace", &self.backtrace.is_some())
            .finish()
    }
}

impl ErrorLike for CapturedError {
    fn kind(&self) -> String {
        self.kind.clone()
    }

    fn message(&self) -> String {
        self.message.clone()
    }

    fn backtrace(&self) -> Option<Vec<String>> {
        self.backtrace.clone()
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes.get(name).cloned()
    }
}

/// `std::num::ParseIntError` -> `ParseIntError`, `a::Wrapper<b::C>` -> `Wrapper`.
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

fn leading_identifier(text: &str) -> Option<&str> {
    let end = text
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    let ident = &text[..end];
    match ident.chars().next() {
        Some(c) if c.is_alphabetic() => Some(ident),
        _ => None,
    }
}
