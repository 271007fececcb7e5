use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::error;

use tracing_dd_json::buffered::{BufferConfig, BufferedSink};
use tracing_dd_json::config::Config;
use tracing_dd_json::init::{init_tracing_with_config, LayerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let buffer_config = BufferConfig {
        channel_buffer: 50_000,
        batch_size: 1_000,
        flush_interval: Duration::from_millis(200),
        pretty: false,
    };
    let (sink, handle) = BufferedSink::spawn(tokio::io::sink(), buffer_config);
    let sink = Arc::new(sink);
    let dropped = Arc::clone(&sink.dropped_entries);
    let written = Arc::clone(&sink.written_entries);

    let config = Config::default().with_allow_all_attributes(true);
    init_tracing_with_config(config, sink.clone(), LayerConfig::default())?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, duration_ns = 1500, "load test error");
    }

    let elapsed = start.elapsed();
    println!(
        "formatted {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    sink.flush_and_wait().await?;
    println!(
        "written: {}, dropped: {}",
        written.load(Ordering::Relaxed),
        dropped.load(Ordering::Relaxed)
    );

    // The global subscriber keeps the sink alive, so the writer task is not
    // awaited here.
    drop(handle);
    Ok(())
}
