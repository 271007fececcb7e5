use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::env::{
    env_opt, env_or, DD_LOG_ALLOW_ALL_ATTRIBUTES_ENV, DD_LOG_LOGGER_NAME_ENV, DD_LOG_MAX_MESSAGE_LENGTH_ENV,
    DD_LOG_PID_ENV, DD_LOG_PRETTY_ENV, DD_LOG_THREAD_NAME_ENV,
};
use crate::exception::BacktraceCleaner;
use crate::identity::{HostIdentity, ProcessIdentity};
use crate::mapping::MappingRule;

/// Errors detected while validating configuration or building a mapping.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("max_message_length must be a positive integer")]
    InvalidMaxMessageLength,

    #[error("only one wildcard attribute rule may be configured")]
    DuplicateWildcard,

    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },
}

/// How the `pid` standard field is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "PidRepr")]
pub enum PidMode {
    /// The OS process id.
    #[default]
    Included,
    /// No `pid` key at all.
    Excluded,
    /// The identity's cross-process identifier.
    Global,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PidRepr {
    Flag(bool),
    Mode(String),
}

impl TryFrom<PidRepr> for PidMode {
    type Error = String;

    fn try_from(repr: PidRepr) -> Result<Self, Self::Error> {
        match repr {
            PidRepr::Flag(true) => Ok(PidMode::Included),
            PidRepr::Flag(false) => Ok(PidMode::Excluded),
            PidRepr::Mode(mode) => mode.parse().map_err(|_| format!("unknown pid mode {:?}", mode)),
        }
    }
}

impl FromStr for PidMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" | "included" => Ok(PidMode::Included),
            "false" | "excluded" => Ok(PidMode::Excluded),
            "global" => Ok(PidMode::Global),
            _ => Err(()),
        }
    }
}

/// Formatter configuration.
///
/// Plain settings deserialize from any serde format; capabilities
/// (cleaner, overrides, identity) are attached in code.
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Truncate messages longer than this many characters.
    pub max_message_length: Option<usize>,

    pub pid: PidMode,

    /// Emit attributes without an explicit rule at the document root.
    pub allow_all_attributes: bool,

    /// Tag each entry with `logger.thread_name`.
    pub thread_name: bool,

    /// Fallback for `logger.name`.
    pub logger_name: Option<String>,

    /// Pretty-print documents in the built-in sinks.
    pub pretty: bool,

    /// Output key -> accessor name, looked up on every expanded error.
    pub exception_attributes: BTreeMap<String, String>,

    #[serde(skip)]
    pub attribute_mapping: Vec<(String, MappingRule)>,

    #[serde(skip)]
    pub backtrace_cleaner: Option<Arc<dyn BacktraceCleaner>>,

    #[serde(skip)]
    pub identity: Option<Arc<dyn ProcessIdentity>>,
}

impl Config {
    /// Load settings from the `DD_LOG_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| match key {
            DD_LOG_PID_ENV => Some(env_or(key, "true")),
            _ => env_opt(key),
        })
    }

    /// Like [`Config::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(raw) = lookup(DD_LOG_MAX_MESSAGE_LENGTH_ENV) {
            let len = raw.trim().parse::<usize>().map_err(|_| ConfigError::InvalidEnv {
                key: DD_LOG_MAX_MESSAGE_LENGTH_ENV,
                value: raw.clone(),
            })?;
            config.max_message_length = Some(len);
        }
        if let Some(raw) = lookup(DD_LOG_PID_ENV) {
            config.pid = raw.parse().map_err(|_| ConfigError::InvalidEnv {
                key: DD_LOG_PID_ENV,
                value: raw.clone(),
            })?;
        }
        config.allow_all_attributes = parse_flag(&lookup, DD_LOG_ALLOW_ALL_ATTRIBUTES_ENV)?;
        config.thread_name = parse_flag(&lookup, DD_LOG_THREAD_NAME_ENV)?;
        config.pretty = parse_flag(&lookup, DD_LOG_PRETTY_ENV)?;
        config.logger_name = lookup(DD_LOG_LOGGER_NAME_ENV);

        config.validate()?;
        Ok(config)
    }

    pub fn with_max_message_length(mut self, len: usize) -> Self {
        self.max_message_length = Some(len);
        self
    }

    pub fn with_pid(mut self, pid: PidMode) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_allow_all_attributes(mut self, allow: bool) -> Self {
        self.allow_all_attributes = allow;
        self
    }

    pub fn with_thread_name(mut self, enabled: bool) -> Self {
        self.thread_name = enabled;
        self
    }

    pub fn with_logger_name(mut self, name: impl Into<String>) -> Self {
        self.logger_name = Some(name.into());
        self
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Remap `name` with `rule`, replacing the standard rule if there is one.
    pub fn with_attribute_mapping(mut self, name: impl Into<String>, rule: MappingRule) -> Self {
        self.attribute_mapping.push((name.into(), rule));
        self
    }

    /// Copy the error accessor `accessor` into `key` of every expanded error.
    pub fn with_exception_attribute(mut self, key: impl Into<String>, accessor: impl Into<String>) -> Self {
        self.exception_attributes.insert(key.into(), accessor.into());
        self
    }

    pub fn with_backtrace_cleaner(mut self, cleaner: impl BacktraceCleaner + 'static) -> Self {
        self.backtrace_cleaner = Some(Arc::new(cleaner));
        self
    }

    pub fn with_identity(mut self, identity: impl ProcessIdentity + 'static) -> Self {
        self.identity = Some(Arc::new(identity));
        self
    }

    /// Identity in effect: the configured one or [`HostIdentity`].
    pub fn identity(&self) -> Arc<dyn ProcessIdentity> {
        match &self.identity {
            Some(identity) => Arc::clone(identity),
            None => Arc::new(HostIdentity::new()),
        }
    }

    /// Reject settings that can never produce a working logger.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_length == Some(0) {
            return Err(ConfigError::InvalidMaxMessageLength);
        }
        let wildcards = self
            .attribute_mapping
            .iter()
            .filter(|(_, rule)| matches!(rule, MappingRule::Wildcard))
            .count()
            + usize::from(self.allow_all_attributes);
        if wildcards > 1 {
            return Err(ConfigError::DuplicateWildcard);
        }
        Ok(())
    }
}

fn parse_flag<F>(lookup: &F, key: &'static str) -> Result<bool, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
{
    match lookup(key).as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if v == "1" || v == "true" || v == "yes" => Ok(true),
        Some(v) if v == "0" || v == "false" || v == "no" => Ok(false),
        Some(v) => Err(ConfigError::InvalidEnv { key, value: v }),
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("max_message_length", &self.max_message_length)
            .field("pid", &self.pid)
            .field("allow_all_attributes", &self.allow_all_attributes)
            .field("thread_name", &self.thread_name)
            .field("logger_name", &self.logger_name)
            .field("pretty", &self.pretty)
            .field("exception_attributes", &self.exception_attributes)
            .field("attribute_mapping", &self.attribute_mapping)
            .field("backtrace_cleaner", &self.backtrace_cleaner.is_some())
            .field("identity", &self.identity.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let vars: HashMap<&'static str, String> = vars.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |key: &'static str| vars.get(key).cloned()
    }

    #[test]
    fn zero_message_length_is_rejected() {
        let err = Config::default().with_max_message_length(0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMaxMessageLength));
    }

    #[test]
    fn wildcard_override_conflicts_with_allow_all() {
        let config = Config::default()
            .with_allow_all_attributes(true)
            .with_attribute_mapping("*", MappingRule::Wildcard);
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateWildcard)));
    }

    #[test]
    fn reads_environment_lookup() {
        let config = Config::from_lookup(lookup(&[
            (DD_LOG_MAX_MESSAGE_LENGTH_ENV, "120"),
            (DD_LOG_PID_ENV, "global"),
            (DD_LOG_ALLOW_ALL_ATTRIBUTES_ENV, "true"),
            (DD_LOG_LOGGER_NAME_ENV, "billing"),
        ]))
        .unwrap();

        assert_eq!(config.max_message_length, Some(120));
        assert_eq!(config.pid, PidMode::Global);
        assert!(config.allow_all_attributes);
        assert!(!config.thread_name);
        assert_eq!(config.logger_name.as_deref(), Some("billing"));
    }

    #[test]
    fn invalid_environment_values_fail_fast() {
        let err = Config::from_lookup(lookup(&[(DD_LOG_PID_ENV, "sometimes")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { key: DD_LOG_PID_ENV, .. }));

        let err = Config::from_lookup(lookup(&[(DD_LOG_MAX_MESSAGE_LENGTH_ENV, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMaxMessageLength));
    }

    #[test]
    fn deserializes_pid_as_flag_or_mode() {
        let config: Config = serde_json::from_str(r#"{"pid": false, "max_message_length": 10}"#).unwrap();
        assert_eq!(config.pid, PidMode::Excluded);
        assert_eq!(config.max_message_length, Some(10));

        let config: Config = serde_json::from_str(r#"{"pid": "global"}"#).unwrap();
        assert_eq!(config.pid, PidMode::Global);

        assert!(serde_json::from_str::<Config>(r#"{"pid": "maybe"}"#).is_err());
    }
}
