use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::{Config, ConfigError, PidMode};
use crate::identity::ProcessIdentity;
use crate::mapping::{AttributeMapping, MappingRule, TransformOutput, MESSAGE, PID, PROGNAME, SEVERITY, TIME};
use crate::record::describe_json;

/// Key under which the wildcard rule is installed.
pub const WILDCARD_KEY: &str = "*";

/// Appended to truncated messages.
pub const ELLIPSIS: char = '…';

/// Build the rule set for one logger configuration.
///
/// Standard rules come first, then the wildcard when `allow_all_attributes`,
/// then `overrides`, which replace earlier rules key by key. An override for `message` wins over truncation.
pub fn build_mapping(
    pid_mode: PidMode,
    overrides: &[(String, MappingRule)],
    allow_all_attributes: bool,
    max_message_length: Option<usize>,
    identity: Arc<dyn ProcessIdentity>,
) -> Result<AttributeMapping, ConfigError> {
    let message_rule = match max_message_length {
        Some(0) => return Err(ConfigError::InvalidMaxMessageLength),
        Some(limit) => truncation_rule(limit),
        None => MappingRule::Passthrough,
    };

    let mut rules: Vec<(String, MappingRule)> = vec![
        (TIME.to_string(), MappingRule::key("timestamp")),
        (SEVERITY.to_string(), MappingRule::key("status")),
        (MESSAGE.to_string(), message_rule),
        (PROGNAME.to_string(), MappingRule::nested(["logger", "name"])),
    ];

    match pid_mode {
        PidMode::Included => rules.push((PID.to_string(), MappingRule::key("pid"))),
        PidMode::Global => rules.push((
            PID.to_string(),
            MappingRule::transform(move |_| TransformOutput::Scalar(Value::String(identity.global_pid()))),
        )),
        PidMode::Excluded => {}
    }

    if allow_all_attributes {
        rules.push((WILDCARD_KEY.to_string(), MappingRule::Wildcard));
    }

    rules.extend(overrides.iter().cloned());

    AttributeMapping::from_rules(rules)
}

/// Build the mapping described by `config`.
pub fn build_from_config(config: &Config) -> Result<AttributeMapping, ConfigError> {
    config.validate()?;
    build_mapping(
        config.pid,
        &config.attribute_mapping,
        config.allow_all_attributes,
        config.max_message_length,
        config.identity(),
    )
}

fn truncation_rule(limit: usize) -> MappingRule {
    MappingRule::transform(move |value| {
        let mut partial = Map::new();
        partial.insert(MESSAGE.to_string(), Value::String(truncate(&describe_json(value), limit)));
        TransformOutput::Merge(partial)
    })
}

/// Shorten `text` to at most `limit` characters, the last being [`ELLIPSIS`].
pub fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(limit.saturating_sub(1)).collect();
    truncated.push(ELLIPSIS);
    truncated
}
