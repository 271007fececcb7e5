use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use tracing_dd_json::config::{Config, PidMode};
use tracing_dd_json::exception::{CapturedError, SilencingCleaner};
use tracing_dd_json::init::{init_tracing_with_config, LayerConfig};
use tracing_dd_json::mapping::{MappingRule, TransformOutput};
use tracing_dd_json::record::{LogRecord, Severity};
use tracing_dd_json::sink::JsonWriterSink;

/// Remaps application attribute names onto the platform's reserved ones and
/// shows a transform that restructures a value.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default()
        .with_pid(PidMode::Global)
        .with_max_message_length(80)
        .with_thread_name(true)
        .with_attribute_mapping("user_id", MappingRule::nested(["usr", "id"]))
        .with_attribute_mapping("user_email", MappingRule::nested(["usr", "email"]))
        .with_attribute_mapping("request_id", MappingRule::key("dd.trace_id"))
        .with_attribute_mapping(
            "env",
            MappingRule::transform(|v| {
                let env = v.as_str().unwrap_or_default().to_lowercase();
                TransformOutput::at(["service", "env"], Value::String(env))
            }),
        )
        .with_attribute_mapping("duration", MappingRule::Passthrough)
        .with_exception_attribute("retryable", "retryable")
        .with_backtrace_cleaner(SilencingCleaner::new(["/rustc/", "std::"]));

    let sink = Arc::new(JsonWriterSink::stdout());
    let logger = init_tracing_with_config(config, sink, LayerConfig { enable_stderr: true })?;

    info!(user_id = 7, user_email = "ann@example.com", env = "PROD", duration_micros = 840.0, "profile loaded");

    // Records can also be built and logged without going through `tracing`.
    let err = CapturedError::new("LockTimeout", "row lock not acquired").with_attribute("retryable", true);
    logger.log(LogRecord::new(Severity::Error, err).with_progname("db"))?;

    Ok(())
}
