use std::io::Write;
use std::sync::Mutex;

use crate::record::JsonObject;

/// Error type returned by [`LogSink`] implementations.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("failed to write log entry: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize log entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("sink writer lock was poisoned")]
    Poisoned,

    #[error("log channel full, entry dropped")]
    ChannelFull,

    #[error("log channel closed")]
    Closed,
}

/// Destination for formatted entries.
///
/// `send` is called synchronously on the thread that emitted the log call,
/// once per entry. Implementations must make each call land as one
/// document, whatever interleaving concurrent callers produce.
pub trait LogSink: Send + Sync {
    /// Write a single formatted entry.
    fn send(&self, entry: &JsonObject) -> Result<(), SinkError>;

    /// Flush any buffered entries. Default implementation is a no-op.
    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Serialize an entry as one JSON document followed by a newline.
pub fn encode_line(entry: &JsonObject, pretty: bool) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = if pretty {
        serde_json::to_vec_pretty(entry)?
    } else {
        serde_json::to_vec(entry)?
    };
    bytes.push(b'\n');
    Ok(bytes)
}

/// Writes newline-delimited JSON to any `std::io::Write`.
pub struct JsonWriterSink<W> {
    writer: Mutex<W>,
    pretty: bool,
}

impl<W: Write + Send> JsonWriterSink<W> {
    pub fn new(writer: W) -> Self {
        JsonWriterSink {
            writer: Mutex::new(writer),
            pretty: false,
        }
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Recover the writer, e.g. to inspect what was written.
    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer.into_inner().map_err(|_| SinkError::Poisoned)
    }
}

impl JsonWriterSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        JsonWriterSink::new(std::io::stdout())
    }
}

impl<W: Write + Send> LogSink for JsonWriterSink<W> {
    fn send(&self, entry: &JsonObject) -> Result<(), SinkError> {
        let line = encode_line(entry, self.pretty)?;
        let mut writer = self.writer.lock().map_err(|_| SinkError::Poisoned)?;
        writer.write_all(&line)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().map_err(|_| SinkError::Poisoned)?;
        writer.flush()?;
        Ok(())
    }
}

/// Keeps every entry in memory. Handy in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<JsonObject>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the entries received so far.
    pub fn entries(&self) -> Vec<JsonObject> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl LogSink for MemorySink {
    fn send(&self, entry: &JsonObject) -> Result<(), SinkError> {
        self.entries
            .lock()
            .map_err(|_| SinkError::Poisoned)?
            .push(entry.clone());
        Ok(())
    }
}
