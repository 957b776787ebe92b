use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::BatchConfig;
use crate::consumer::{complete, serialize, BatchSender, Consumer, EventBuffer};
use crate::error::{ConfigError, ReportError};
use crate::event::Callback;
use crate::record::WireRecord;
use crate::transport::{HttpTransport, Transport};

/// Buffers records in memory and sends them once `batch_size` are waiting, on an explicit
/// flush, or on close. The send happens inside the call that triggered it.
pub struct BatchConsumer {
    sender: BatchSender,
    buffer: EventBuffer,
    batch_size: usize,
}

impl BatchConsumer {
    pub fn new(server_url: &str, app_id: &str, config: BatchConfig) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(server_url, config.request_timeout)?;
        Self::with_transport(Arc::new(transport), app_id, config)
    }

    pub fn with_transport(
        transport: Arc<dyn Transport + Send + Sync>,
        app_id: &str,
        config: BatchConfig,
    ) -> Result<Self, ConfigError> {
        if app_id.is_empty() {
            return Err(ConfigError::MissingField("app_id"));
        }
        let batch_size = config.batch_size.max(1);
        info!(batch_size, compress = config.compress, "batch consumer ready");

        Ok(Self {
            sender: BatchSender::new(transport, app_id.to_owned(), config.compress),
            buffer: EventBuffer::default(),
            batch_size,
        })
    }

    /// Number of records waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    async fn send(&self, batch: Vec<String>) -> Result<(), ReportError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.sender.send(batch).await?;
        Ok(())
    }
}

#[async_trait]
impl Consumer for BatchConsumer {
    async fn add(&self, record: WireRecord, callback: Option<Callback>) {
        let event = match serialize(&record) {
            Ok(event) => event,
            Err(e) => return complete(callback, Err(e)),
        };
        debug!(event = %event, "enqueue data");

        let result = match self.buffer.push(event, self.batch_size) {
            Ok(Some(batch)) => self.send(batch).await,
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        complete(callback, result);
    }

    async fn flush(&self, callback: Option<Callback>) {
        let result = self.send(self.buffer.take()).await;
        complete(callback, result);
    }

    async fn close(&self, callback: Option<Callback>) {
        let result = match self.buffer.close() {
            Some(remaining) => self.send(remaining).await,
            None => Ok(()),
        };
        info!("batch consumer closed");
        complete(callback, result);
    }
}
