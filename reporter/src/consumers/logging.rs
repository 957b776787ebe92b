use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::config::LoggingConfig;
use crate::consumer::{complete, serialize, Consumer};
use crate::error::{ConfigError, DeliveryError, ReportError};
use crate::event::Callback;
use crate::record::WireRecord;
use crate::rotation::{LineWriter, RotatingFileWriter};
use crate::time::{SystemTime, TimeSource};

/// Appends every record as one JSON line to local files, for a collector to ship later.
pub struct LoggingConsumer {
    writer: Mutex<Box<dyn LineWriter + Send>>,
    closed: AtomicBool,
}

impl LoggingConsumer {
    pub fn new(directory: impl AsRef<Path>, config: LoggingConfig) -> Result<Self, ConfigError> {
        Self::with_timesource(directory, config, Arc::new(SystemTime {}))
    }

    pub fn with_timesource(
        directory: impl AsRef<Path>,
        config: LoggingConfig,
        timesource: Arc<dyn TimeSource + Send + Sync>,
    ) -> Result<Self, ConfigError> {
        let writer = RotatingFileWriter::new(
            directory.as_ref(),
            config.file_prefix.as_deref(),
            config.rotation(),
            timesource,
        )
        .map_err(ConfigError::LogDirectory)?;
        info!(
            directory = %directory.as_ref().display(),
            rotation = ?config.rotation(),
            "logging consumer ready"
        );

        Ok(Self::with_writer(Box::new(writer)))
    }

    pub fn with_writer(writer: Box<dyn LineWriter + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        }
    }

    fn writer(&self) -> MutexGuard<'_, Box<dyn LineWriter + Send>> {
        self.writer.lock().unwrap_or_else(|poisoned| {
            warn!("poisoned log writer mutex");
            poisoned.into_inner()
        })
    }

    fn append(&self, record: &WireRecord) -> Result<(), ReportError> {
        let line = serialize(record)?;
        debug!(line = %line, "append record");

        self.writer().write_line(&line).map_err(|e| {
            error!("failed to append record: {}", e);
            ReportError::Delivery(DeliveryError::Io(e))
        })
    }
}

#[async_trait]
impl Consumer for LoggingConsumer {
    async fn add(&self, record: WireRecord, callback: Option<Callback>) {
        if self.closed.load(Ordering::SeqCst) {
            return complete(callback, Err(ReportError::Closed));
        }
        complete(callback, self.append(&record));
    }

    /// Lines are written straight through, nothing is held back.
    async fn flush(&self, callback: Option<Callback>) {
        complete(callback, Ok(()));
    }

    async fn close(&self, callback: Option<Callback>) {
        self.closed.store(true, Ordering::SeqCst);
        let result = self
            .writer()
            .close()
            .map_err(|e| ReportError::Delivery(DeliveryError::Io(e)));
        info!("logging consumer closed");
        complete(callback, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EventType;
    use crate::test_utils::{record, CallbackRecorder, MemoryWriter};

    #[tokio::test]
    async fn each_record_is_one_line() {
        let writer = MemoryWriter::default();
        let consumer = LoggingConsumer::with_writer(Box::new(writer.clone()));
        let callbacks = CallbackRecorder::default();

        consumer
            .add(record(EventType::Track, "one"), Some(callbacks.callback()))
            .await;
        consumer.add(record(EventType::UserSet, "two"), None).await;

        assert_eq!(callbacks.results(), vec![Ok(())]);
        let lines = writer.lines();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first["#event_name"], "one");
        assert_eq!(first["#type"], "track");
    }

    #[tokio::test]
    async fn close_finalizes_the_writer() {
        let writer = MemoryWriter::default();
        let consumer = LoggingConsumer::with_writer(Box::new(writer.clone()));
        let callbacks = CallbackRecorder::default();

        consumer.close(Some(callbacks.callback())).await;
        consumer
            .add(record(EventType::Track, "late"), Some(callbacks.callback()))
            .await;

        assert!(writer.is_closed());
        assert!(writer.lines().is_empty());
        assert_eq!(
            callbacks.results(),
            vec![Ok(()), Err("consumer is closed".to_owned())]
        );
    }
}
