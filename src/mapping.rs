use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::config::ConfigError;
use crate::record::{JsonObject, Severity};

/// Rule keys of the five standard fields, in evaluation order.
pub const TIME: &str = "time";
pub const SEVERITY: &str = "severity";
pub const MESSAGE: &str = "message";
pub const PROGNAME: &str = "progname";
pub const PID: &str = "pid";

/// What a [`MappingRule::Transform`] produces for one value.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutput {
    /// Written under the source field's own name.
    Scalar(Value),
    /// Deep-merged into the output root.
    Merge(JsonObject),
}

impl TransformOutput {
    /// Partial mapping holding `value` at the nested `path`.
    pub fn at<I, S>(path: I, value: impl Into<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = path.into_iter().map(Into::into).collect();
        let mut object = Map::new();
        set_path(&mut object, &segments, value.into());
        TransformOutput::Merge(object)
    }
}

type TransformFn = dyn Fn(&Value) -> TransformOutput + Send + Sync;

/// Shared, thread-safe transform function.
#[derive(Clone)]
pub struct Transform(Arc<TransformFn>);

impl Transform {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> TransformOutput + Send + Sync + 'static,
    {
        Transform(Arc::new(f))
    }

    pub fn apply(&self, value: &Value) -> TransformOutput {
        (self.0)(value)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transform(..)")
    }
}

/// Instruction deciding where a field or attribute lands in the output.
#[derive(Debug, Clone)]
pub enum MappingRule {
    /// Flat key (one segment) or nested path.
    Path(Vec<String>),
    /// Keep the value under its own name.
    Passthrough,
    Transform(Transform),
    /// Emit every attribute without an explicit rule at the root.
    Wildcard,
}

impl MappingRule {
    pub fn key(name: impl Into<String>) -> Self {
        MappingRule::Path(vec![name.into()])
    }

    pub fn nested<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MappingRule::Path(path.into_iter().map(Into::into).collect())
    }

    pub fn transform<F>(f: F) -> Self
    where
        F: Fn(&Value) -> TransformOutput + Send + Sync + 'static,
    {
        MappingRule::Transform(Transform::new(f))
    }

    fn apply(&self, name: &str, value: Value, output: &mut JsonObject) {
        match self {
            MappingRule::Path(path) if path.is_empty() => {
                output.insert(name.to_string(), value);
            }
            MappingRule::Path(path) => set_path(output, path, value),
            MappingRule::Passthrough | MappingRule::Wildcard => {
                output.insert(name.to_string(), value);
            }
            MappingRule::Transform(transform) => match transform.apply(&value) {
                TransformOutput::Scalar(scalar) => {
                    output.insert(name.to_string(), scalar);
                }
                TransformOutput::Merge(partial) => deep_merge(output, partial),
            },
        }
    }
}

/// Immutable rule set keyed by standard field or attribute name.
///
/// Cheap to clone and safe to share between threads.
#[derive(Debug, Clone, Default)]
pub struct AttributeMapping {
    rules: Arc<Vec<(String, MappingRule)>>,
    wildcard: bool,
}

impl AttributeMapping {
    /// Build a mapping from `(key, rule)` pairs. Later pairs replace earlier
    /// ones with the same key; more than one wildcard rule is rejected.
    pub fn from_rules<I, K>(rules: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, MappingRule)>,
        K: Into<String>,
    {
        let mut entries: Vec<(String, MappingRule)> = Vec::new();
        for (key, rule) in rules {
            let key = key.into();
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = rule,
                None => entries.push((key, rule)),
            }
        }

        let wildcards = entries
            .iter()
            .filter(|(_, rule)| matches!(rule, MappingRule::Wildcard))
            .count();
        if wildcards > 1 {
            return Err(ConfigError::DuplicateWildcard);
        }

        Ok(AttributeMapping {
            rules: Arc::new(entries),
            wildcard: wildcards == 1,
        })
    }

    pub fn rule(&self, key: &str) -> Option<&MappingRule> {
        self.rules.iter().find(|(k, _)| k == key).map(|(_, rule)| rule)
    }

    pub fn has_wildcard(&self) -> bool {
        self.wildcard
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(k, _)| k.as_str())
    }
}

/// The five standard fields of a formatted entry.
#[derive(Debug, Clone)]
pub struct NamedFields {
    pub time: DateTime<Utc>,
    pub severity: Severity,
    pub message: Value,
    pub progname: Option<String>,
    pub pid: u32,
}

impl NamedFields {
    fn into_values(self) -> [(&'static str, Option<Value>); 5] {
        [
            (
                TIME,
                Some(Value::String(self.time.to_rfc3339_opts(SecondsFormat::Millis, true))),
            ),
            (SEVERITY, Some(Value::String(self.severity.as_str().to_string()))),
            (MESSAGE, Some(self.message)),
            (PROGNAME, self.progname.map(Value::String)),
            (PID, Some(Value::from(self.pid))),
        ]
    }
}

/// Apply `mapping` to one entry's standard fields and attributes.
///
/// Standard fields are placed first, then attributes in their given order.
/// Attributes without an explicit rule only survive when the mapping carries
/// a wildcard rule.
pub fn apply_mapping(mapping: &AttributeMapping, fields: NamedFields, attributes: JsonObject) -> JsonObject {
    let mut output = Map::new();

    for (name, value) in fields.into_values() {
        let (Some(rule), Some(value)) = (mapping.rule(name), value) else {
            continue;
        };
        rule.apply(name, value, &mut output);
    }

    for (name, value) in attributes {
        match mapping.rule(&name) {
            Some(rule) => rule.apply(&name, value, &mut output),
            None if mapping.has_wildcard() => {
                output.insert(name, value);
            }
            None => {}
        }
    }

    output
}

/// Write `value` at `path`, creating intermediate objects and keeping any
/// siblings already present. Scalars in the way are replaced by objects.
pub fn set_path(output: &mut JsonObject, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = output;
    for segment in parents {
        let slot = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(map) => map,
            _ => unreachable!("slot was just made an object"),
        };
    }
    current.insert(last.clone(), value);
}

/// Recursively merge `partial` into `output`; objects merge, anything else
/// overwrites.
pub fn deep_merge(output: &mut JsonObject, partial: JsonObject) {
    for (key, value) in partial {
        match value {
            Value::Object(incoming) => {
                if let Some(Value::Object(existing)) = output.get_mut(&key) {
                    deep_merge(existing, incoming);
                } else {
                    output.insert(key, Value::Object(incoming));
                }
            }
            other => {
                output.insert(key, other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fields() -> NamedFields {
        NamedFields {
            time: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            severity: Severity::Info,
            message: json!("hello"),
            progname: Some("api".to_string()),
            pid: 42,
        }
    }

    fn attrs(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn applies_standard_rules_in_order() {
        let mapping = AttributeMapping::from_rules([
            (TIME, MappingRule::key("timestamp")),
            (SEVERITY, MappingRule::key("status")),
            (MESSAGE, MappingRule::Passthrough),
            (PROGNAME, MappingRule::nested(["logger", "name"])),
            (PID, MappingRule::key("pid")),
        ])
        .unwrap();

        let out = apply_mapping(&mapping, fields(), Map::new());
        assert_eq!(
            Value::Object(out.clone()),
            json!({
                "timestamp": "2024-01-15T10:30:00.000Z",
                "status": "INFO",
                "message": "hello",
                "logger": {"name": "api"},
                "pid": 42
            })
        );
        let keys: Vec<&String> = out.keys().collect();
        assert_eq!(keys, vec!["timestamp", "status", "message", "logger", "pid"]);
    }

    #[test]
    fn unmapped_attributes_are_dropped_without_wildcard() {
        let mapping = AttributeMapping::from_rules([(MESSAGE, MappingRule::Passthrough)]).unwrap();
        let out = apply_mapping(&mapping, fields(), attrs(json!({"user": "bob"})));
        assert_eq!(Value::Object(out), json!({"message": "hello"}));
    }

    #[test]
    fn explicit_rules_win_over_wildcard() {
        let mapping = AttributeMapping::from_rules([
            ("*", MappingRule::Wildcard),
            ("user_id", MappingRule::nested(["usr", "id"])),
        ])
        .unwrap();

        let out = apply_mapping(&mapping, fields(), attrs(json!({"user_id": 7, "path": "/x"})));
        assert_eq!(Value::Object(out), json!({"usr": {"id": 7}, "path": "/x"}));
    }

    #[test]
    fn nested_writes_keep_siblings() {
        let mapping = AttributeMapping::from_rules([
            ("user_id", MappingRule::nested(["usr", "id"])),
            ("user_name", MappingRule::nested(["usr", "name"])),
            (
                "email",
                MappingRule::transform(|v| TransformOutput::at(["usr", "email"], v.clone())),
            ),
        ])
        .unwrap();

        let out = apply_mapping(
            &mapping,
            fields(),
            attrs(json!({"user_id": 1, "user_name": "ann", "email": "a@x"})),
        );
        assert_eq!(
            Value::Object(out),
            json!({"usr": {"id": 1, "name": "ann", "email": "a@x"}})
        );
    }

    #[test]
    fn scalar_transform_keeps_field_name() {
        let mapping = AttributeMapping::from_rules([(
            "env",
            MappingRule::transform(|v| TransformOutput::Scalar(json!(v.as_str().unwrap_or("").to_lowercase()))),
        )])
        .unwrap();

        let out = apply_mapping(&mapping, fields(), attrs(json!({"env": "PROD"})));
        assert_eq!(Value::Object(out), json!({"env": "prod"}));
    }

    #[test]
    fn missing_progname_is_skipped() {
        let mapping = AttributeMapping::from_rules([(PROGNAME, MappingRule::nested(["logger", "name"]))]).unwrap();
        let mut named = fields();
        named.progname = None;
        assert!(apply_mapping(&mapping, named, Map::new()).is_empty());
    }

    #[test]
    fn second_wildcard_is_rejected() {
        let err = AttributeMapping::from_rules([("*", MappingRule::Wildcard), ("all", MappingRule::Wildcard)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateWildcard));
    }

    #[test]
    fn set_path_replaces_scalar_parent() {
        let mut out = attrs(json!({"usr": "bob"}));
        set_path(&mut out, &["usr".to_string(), "id".to_string()], json!(1));
        assert_eq!(Value::Object(out), json!({"usr": {"id": 1}}));
    }
}
