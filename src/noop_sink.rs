use crate::record::JsonObject;
use crate::sink::{LogSink, SinkError};

/// A sink that simply drops all entries.
///
/// Useful for measuring the cost of formatting alone, without any I/O.
#[derive(Clone, Default)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn send(&self, _entry: &JsonObject) -> Result<(), SinkError> {
        Ok(())
    }
}
