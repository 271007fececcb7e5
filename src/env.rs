//! Environment variable names read by [`Config::from_env`](crate::config::Config::from_env).
//!
//! These are purely helpers; the formatter itself never reads the
//! environment.

/// Maximum message length in characters; unset disables truncation.
pub const DD_LOG_MAX_MESSAGE_LENGTH_ENV: &str = "DD_LOG_MAX_MESSAGE_LENGTH";

/// `true`, `false` or `global`.
pub const DD_LOG_PID_ENV: &str = "DD_LOG_PID";

/// Emit attributes without an explicit mapping at the document root.
pub const DD_LOG_ALLOW_ALL_ATTRIBUTES_ENV: &str = "DD_LOG_ALLOW_ALL_ATTRIBUTES";

/// Tag entries with `logger.thread_name`.
pub const DD_LOG_THREAD_NAME_ENV: &str = "DD_LOG_THREAD_NAME";

/// Pretty-print documents written by the built-in sinks.
pub const DD_LOG_PRETTY_ENV: &str = "DD_LOG_PRETTY";

/// Value for `logger.name` when an entry carries none.
pub const DD_LOG_LOGGER_NAME_ENV: &str = "DD_LOG_LOGGER_NAME";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an environment variable, treating empty values as unset.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
