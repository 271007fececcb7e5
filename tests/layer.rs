use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use tracing_dd_json::config::{Config, PidMode};
use tracing_dd_json::identity::StaticIdentity;
use tracing_dd_json::layer::DatadogJsonLayer;
use tracing_dd_json::logger::Logger;
use tracing_dd_json::mapping::MappingRule;
use tracing_dd_json::record::JsonObject;
use tracing_dd_json::sink::MemorySink;

#[derive(Debug)]
struct UpstreamTimeout;

impl fmt::Display for UpstreamTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("upstream timed out")
    }
}

impl std::error::Error for UpstreamTimeout {}

fn capture(config: Config, emit: impl FnOnce()) -> Vec<JsonObject> {
    let sink = Arc::new(MemorySink::new());
    let logger = Arc::new(Logger::new(config, sink.clone()).expect("valid config"));
    let layer = DatadogJsonLayer::new(logger);
    let total = Arc::clone(&layer.total_events);

    tracing::subscriber::with_default(Registry::default().with(layer), emit);

    let entries = sink.entries();
    assert_eq!(total.load(Ordering::Relaxed), entries.len() as u64);
    entries
}

#[test]
fn renders_standard_fields() {
    let entries = capture(Config::default(), || {
        tracing::warn!(target: "billing", "card declined for {}", "order-9");
    });

    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry["message"], json!("card declined for order-9"));
    assert_eq!(entry["status"], json!("WARN"));
    assert_eq!(entry["logger"], json!({"name": "billing"}));
    assert_eq!(entry["pid"], json!(std::process::id()));
    assert!(entry["timestamp"].as_str().unwrap().ends_with('Z'));
    let keys: Vec<&String> = entry.keys().collect();
    assert_eq!(keys, vec!["timestamp", "status", "message", "logger", "pid"]);
}

#[test]
fn closed_mapping_drops_unknown_fields() {
    let entries = capture(Config::default().with_pid(PidMode::Excluded), || {
        tracing::info!(user = "bob", attempts = 3, error = "x", "login");
    });

    let entry = &entries[0];
    assert!(!entry.contains_key("user"));
    assert!(!entry.contains_key("error"));
    assert!(!entry.contains_key("attempts"));
    assert!(!entry.contains_key("pid"));
}

#[test]
fn allow_all_with_remapping_and_durations() {
    let config = Config::default()
        .with_allow_all_attributes(true)
        .with_attribute_mapping("user_id", MappingRule::nested(["usr", "id"]))
        .with_attribute_mapping("user_email", MappingRule::nested(["usr", "email"]))
        .with_logger_name("api");

    let entries = capture(config, || {
        tracing::info!(user_id = 42u64, user_email = "a@b.c", route = "/pay", duration_ms = 1.1, ok = true, "served");
    });

    let entry = &entries[0];
    assert_eq!(entry["usr"], json!({"id": 42, "email": "a@b.c"}));
    assert_eq!(entry["route"], json!("/pay"));
    assert_eq!(entry["ok"], json!(true));
    assert_eq!(entry["duration"], json!(1_100_000));
    assert!(!entry.contains_key("duration_ms"));
    assert_eq!(entry["logger"], json!({"name": "api"}));
}

#[test]
fn error_fields_are_expanded() {
    let config = Config::default().with_allow_all_attributes(true);
    let err = UpstreamTimeout;

    let entries = capture(config, || {
        tracing::error!(exception = &err as &(dyn std::error::Error + 'static), "request failed");
    });

    let entry = &entries[0];
    assert_eq!(entry["message"], json!("request failed"));
    assert_eq!(entry["exception"]["kind"], json!("UpstreamTimeout"));
    assert_eq!(entry["exception"]["message"], json!("upstream timed out"));
    assert!(!entry.contains_key("error"));
}

#[test]
fn truncation_and_thread_tag() {
    let config = Config::default()
        .with_max_message_length(10)
        .with_thread_name(true)
        .with_identity(StaticIdentity {
            global_pid: "h-1".to_string(),
            thread_name: "io-worker".to_string(),
        })
        .with_pid(PidMode::Global);

    let entries = capture(config, || {
        tracing::info!("this message is far too long");
    });

    let entry = &entries[0];
    let message = entry["message"].as_str().unwrap();
    assert_eq!(message, "this mess…");
    assert_eq!(message.chars().count(), 10);
    assert_eq!(entry["pid"], json!("h-1"));
    assert_eq!(entry["logger"]["thread_name"], json!("io-worker"));
}

#[test]
fn concurrent_callers_share_one_logger() {
    let sink = Arc::new(MemorySink::new());
    let logger = Arc::new(Logger::new(Config::default().with_allow_all_attributes(true), sink.clone()).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let logger = Arc::clone(&logger);
            std::thread::spawn(move || {
                for n in 0..25 {
                    let record = tracing_dd_json::record::LogRecord::new(
                        tracing_dd_json::record::Severity::Info,
                        "tick",
                    )
                    .with_attribute("worker", worker as i64)
                    .with_attribute("n", n as i64);
                    logger.log(record).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let entries = sink.entries();
    assert_eq!(entries.len(), 100);
    assert!(entries.iter().all(|e| e["message"] == Value::from("tick")));
}
