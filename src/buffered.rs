use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Duration, Instant, MissedTickBehavior};

use crate::record::JsonObject;
use crate::sink::{encode_line, LogSink, SinkError};

/// Buffering settings for [`BufferedSink`].
///
/// **Fields**
/// - `channel_buffer`: maximum number of encoded entries queued before new
///   ones are dropped.
/// - `batch_size`: number of entries written per batch.
/// - `flush_interval`: longest time a partial batch waits before writing.
/// - `pretty`: pretty-print each document.
#[derive(Clone, Debug)]
pub struct BufferConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub pretty: bool,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            pretty: false,
        }
    }
}

const MAX_WRITE_ATTEMPTS: u32 = 3;

enum Message {
    Line(Vec<u8>),
    /// Write the pending batch now, then acknowledge if anyone is waiting.
    Flush(Option<oneshot::Sender<()>>),
}

/// Sink that encodes entries on the calling thread and hands them to a
/// background task over a bounded channel, so slow output never blocks the
/// code that logs.
///
/// [`LogSink::flush`] only queues a flush request behind the entries already
/// sent and returns without waiting for the write. Use
/// [`BufferedSink::flush_and_wait`] from async code to wait until everything
/// sent before it has been written.
pub struct BufferedSink {
    sender: mpsc::Sender<Message>,
    pretty: bool,
    /// Entries accepted into the channel.
    pub enqueued_entries: Arc<AtomicU64>,
    /// Dropped because the channel was full.
    pub dropped_entries: Arc<AtomicU64>,
    /// Entries the background task wrote successfully.
    pub written_entries: Arc<AtomicU64>,
}

impl BufferedSink {
    /// Create the sink and spawn its writer task on the current Tokio
    /// runtime. The task finishes once every sender is dropped and the queue
    /// is drained, returning the writer.
    ///
    /// Minimal thresholds are enforced for `channel_buffer`, `batch_size`
    /// and `flush_interval` to avoid degenerate configurations.
    pub fn spawn<W>(writer: W, config: BufferConfig) -> (Self, JoinHandle<W>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let buffer = config.channel_buffer.max(16);
        let batch_size = config.batch_size.max(1);
        let flush_interval = config.flush_interval.max(Duration::from_millis(10));

        let (tx, mut rx) = mpsc::channel::<Message>(buffer);

        let enqueued_entries = Arc::new(AtomicU64::new(0));
        let dropped_entries = Arc::new(AtomicU64::new(0));
        let written_entries = Arc::new(AtomicU64::new(0));

        let written_bg = Arc::clone(&written_entries);
        let dropped_bg = Arc::clone(&dropped_entries);

        let handle = tokio::spawn(async move {
            let mut writer = writer;
            let mut batch: Vec<Vec<u8>> = Vec::with_capacity(batch_size);
            let mut ticker = interval_at(Instant::now() + flush_interval, flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(Message::Line(line)) => {
                            batch.push(line);
                            if batch.len() >= batch_size {
                                write_batch(&mut writer, &mut batch, &written_bg, &dropped_bg).await;
                            }
                        }
                        Some(Message::Flush(ack)) => {
                            write_batch(&mut writer, &mut batch, &written_bg, &dropped_bg).await;
                            if let Some(ack) = ack {
                                let _ = ack.send(());
                            }
                        }
                        None => {
                            write_batch(&mut writer, &mut batch, &written_bg, &dropped_bg).await;
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        write_batch(&mut writer, &mut batch, &written_bg, &dropped_bg).await;
                    }
                }
            }

            writer
        });

        (
            Self {
                sender: tx,
                pretty: config.pretty,
                enqueued_entries,
                dropped_entries,
                written_entries,
            },
            handle,
        )
    }

    /// Ask the writer task to write its pending batch and wait until it has.
    ///
    /// Entries sent before this call are written (or counted as dropped
    /// after failed retries) by the time it returns.
    pub async fn flush_and_wait(&self) -> Result<(), SinkError> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(Message::Flush(Some(ack)))
            .await
            .map_err(|_| SinkError::Closed)?;
        done.await.map_err(|_| SinkError::Closed)
    }
}

async fn write_batch<W>(writer: &mut W, batch: &mut Vec<Vec<u8>>, written: &AtomicU64, dropped: &AtomicU64)
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return;
    }

    let mut backoff = Duration::from_millis(100);
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        match try_write(writer, batch).await {
            Ok(()) => {
                written.fetch_add(batch.len() as u64, Ordering::Relaxed);
                batch.clear();
                return;
            }
            Err(e) if attempt < MAX_WRITE_ATTEMPTS => {
                eprintln!("log batch write failed ({}), retrying in {:?}", e, backoff);
                sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => {
                eprintln!("log batch write failed ({}), dropping {} entries", e, batch.len());
            }
        }
    }

    dropped.fetch_add(batch.len() as u64, Ordering::Relaxed);
    batch.clear();
}

async fn try_write<W>(writer: &mut W, batch: &[Vec<u8>]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for line in batch {
        writer.write_all(line).await?;
    }
    writer.flush().await
}

impl LogSink for BufferedSink {
    fn send(&self, entry: &JsonObject) -> Result<(), SinkError> {
        let line = encode_line(entry, self.pretty)?;
        match self.sender.try_send(Message::Line(line)) {
            Ok(()) => {
                self.enqueued_entries.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.dropped_entries.fetch_add(1, Ordering::Relaxed);
                Err(SinkError::ChannelFull)
            }
            Err(TrySendError::Closed(_)) => Err(SinkError::Closed),
        }
    }

    /// Queue a flush request without blocking. Fails with
    /// [`SinkError::ChannelFull`] when the queue has no room for it.
    fn flush(&self) -> Result<(), SinkError> {
        match self.sender.try_send(Message::Flush(None)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SinkError::ChannelFull),
            Err(TrySendError::Closed(_)) => Err(SinkError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn entry(n: u64) -> JsonObject {
        match json!({"message": "tick", "n": n}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn drains_queue_when_dropped() {
        let config = BufferConfig {
            batch_size: 2,
            ..BufferConfig::default()
        };
        let (sink, handle) = BufferedSink::spawn(Vec::new(), config);
        for n in 0..5 {
            sink.send(&entry(n)).unwrap();
        }
        let written = Arc::clone(&sink.written_entries);
        drop(sink);

        let output = String::from_utf8(handle.await.unwrap()).unwrap();
        let ns: Vec<u64> = output
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).unwrap()["n"].as_u64().unwrap())
            .collect();
        assert_eq!(ns, vec![0, 1, 2, 3, 4]);
        assert_eq!(written.load(Ordering::Relaxed), 5);
    }

    #[tokio::test]
    async fn flushes_partial_batch_on_interval() {
        let config = BufferConfig {
            batch_size: 100,
            flush_interval: Duration::from_millis(10),
            ..BufferConfig::default()
        };
        let (sink, handle) = BufferedSink::spawn(Vec::new(), config);
        sink.send(&entry(1)).unwrap();

        for _ in 0..100 {
            if sink.written_entries.load(Ordering::Relaxed) == 1 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.written_entries.load(Ordering::Relaxed), 1);

        drop(sink);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn steady_traffic_does_not_starve_interval_writes() {
        let config = BufferConfig {
            batch_size: 100,
            flush_interval: Duration::from_millis(50),
            ..BufferConfig::default()
        };
        let (sink, handle) = BufferedSink::spawn(Vec::new(), config);

        for n in 0..40 {
            sink.send(&entry(n)).unwrap();
            sleep(Duration::from_millis(20)).await;
        }
        // 800ms of sends never fill a batch, so only the interval wrote.
        let written = sink.written_entries.load(Ordering::Relaxed);
        assert!(written >= 30, "only {} of 40 entries written", written);

        drop(sink);
        let output = String::from_utf8(handle.await.unwrap()).unwrap();
        assert_eq!(output.lines().count(), 40);
    }

    #[tokio::test]
    async fn flush_and_wait_writes_partial_batch() {
        let config = BufferConfig {
            batch_size: 100,
            flush_interval: Duration::from_secs(60),
            ..BufferConfig::default()
        };
        let (sink, handle) = BufferedSink::spawn(Vec::new(), config);
        for n in 0..3 {
            sink.send(&entry(n)).unwrap();
        }
        assert_eq!(sink.written_entries.load(Ordering::Relaxed), 0);

        sink.flush_and_wait().await.unwrap();
        assert_eq!(sink.written_entries.load(Ordering::Relaxed), 3);

        drop(sink);
        let output = String::from_utf8(handle.await.unwrap()).unwrap();
        assert_eq!(output.lines().count(), 3);
    }

    #[tokio::test]
    async fn sink_flush_signals_the_writer() {
        let config = BufferConfig {
            batch_size: 100,
            flush_interval: Duration::from_secs(60),
            ..BufferConfig::default()
        };
        let (sink, handle) = BufferedSink::spawn(Vec::new(), config);
        sink.send(&entry(1)).unwrap();
        sink.send(&entry(2)).unwrap();

        LogSink::flush(&sink).unwrap();
        for _ in 0..100 {
            if sink.written_entries.load(Ordering::Relaxed) == 2 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.written_entries.load(Ordering::Relaxed), 2);

        drop(sink);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn flush_after_writer_stopped_reports_closed() {
        let (sink, handle) = BufferedSink::spawn(Vec::new(), BufferConfig::default());
        handle.abort();
        let _ = handle.await;

        assert!(matches!(sink.flush_and_wait().await, Err(SinkError::Closed)));
        assert!(matches!(LogSink::flush(&sink), Err(SinkError::Closed)));
    }
}
