use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use metrics::{counter, histogram};
use tracing::{error, info, instrument, warn};

use crate::error::{DeliveryError, ReportError};
use crate::event::Callback;
use crate::record::{WireRecord, LIB_NAME, LIB_VERSION};
use crate::transport::{check_response, HttpRequest, Transport};

pub const DEFAULT_BATCH_SIZE: usize = 20;

const BATCH_PATH: &str = "/sync_server";

/// Delivery strategy for built records.
///
/// Implementations never fail synchronously: every outcome, success or error, is reported
/// through the callback, exactly once per callback. `close` makes one last delivery attempt
/// for anything still buffered; afterwards `add` reports [`ReportError::Closed`].
#[async_trait]
pub trait Consumer {
    async fn add(&self, record: WireRecord, callback: Option<Callback>);
    async fn flush(&self, callback: Option<Callback>);
    async fn close(&self, callback: Option<Callback>);
}

/// Hand `result` to the callback, or log failures when the caller did not provide one.
pub(crate) fn complete(callback: Option<Callback>, result: Result<(), ReportError>) {
    match callback {
        Some(callback) => callback(result),
        None => {
            if let Err(e) = result {
                warn!("event reporting failed: {}", e);
            }
        }
    }
}

pub(crate) fn serialize(record: &WireRecord) -> Result<String, ReportError> {
    record.to_json().map_err(|e| {
        error!("failed to serialize record: {}", e);
        ReportError::Delivery(DeliveryError::Serialization(e))
    })
}

#[derive(Default)]
struct BufferState {
    events: Vec<String>,
    closed: bool,
}

/// Ordered, serialized records waiting for the next flush.
///
/// The closed flag lives under the same lock as the events, so a record is either appended
/// before `close` drains the buffer or refused.
#[derive(Default)]
pub(crate) struct EventBuffer {
    state: Mutex<BufferState>,
}

impl EventBuffer {
    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("poisoned event buffer mutex");
            poisoned.into_inner()
        })
    }

    /// Append an event. When the buffer reaches `batch_size`, it is drained within the same
    /// critical section and the full batch is returned for sending.
    pub fn push(&self, event: String, batch_size: usize) -> Result<Option<Vec<String>>, ReportError> {
        let mut state = self.lock();
        if state.closed {
            return Err(ReportError::Closed);
        }

        state.events.push(event);
        if state.events.len() >= batch_size {
            Ok(Some(std::mem::take(&mut state.events)))
        } else {
            Ok(None)
        }
    }

    /// Swap the buffer for an empty one and return what it held.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().events)
    }

    /// Refuse any further push and return what is left. `None` if already closed.
    pub fn close(&self) -> Option<Vec<String>> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        state.closed = true;
        Some(std::mem::take(&mut state.events))
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }
}

/// Wire logic shared by the batch consumers: one POST per batch, JSON array body,
/// optionally gzipped.
#[derive(Clone)]
pub(crate) struct BatchSender {
    transport: Arc<dyn Transport + Send + Sync>,
    app_id: String,
    compress: bool,
}

impl BatchSender {
    pub fn new(transport: Arc<dyn Transport + Send + Sync>, app_id: String, compress: bool) -> Self {
        Self {
            transport,
            app_id,
            compress,
        }
    }

    #[instrument(skip_all, fields(count = batch.len()))]
    pub async fn send(&self, batch: Vec<String>) -> Result<(), DeliveryError> {
        let count = batch.len();
        info!("flush buffer events");

        let result = self.post(batch).await;
        match &result {
            Ok(_) => {
                counter!("reporter_batches_sent_total").increment(1);
                histogram!("reporter_batch_size").record(count as f64);
            }
            Err(e) => {
                error!("failed to deliver batch: {}", e);
                counter!("reporter_events_dropped_total", "reason" => "delivery")
                    .increment(count as u64);
            }
        }
        result
    }

    async fn post(&self, batch: Vec<String>) -> Result<(), DeliveryError> {
        let content = format!("[{}]", batch.join(","));
        let body = if self.compress {
            Bytes::from(gzip(content.as_bytes())?)
        } else {
            Bytes::from(content)
        };

        let request = HttpRequest {
            path: BATCH_PATH,
            headers: vec![
                ("Content-Type", "application/plaintext".to_owned()),
                ("appid", self.app_id.clone()),
                (
                    "compress",
                    if self.compress { "gzip" } else { "none" }.to_owned(),
                ),
                ("TA-Integration-Type", LIB_NAME.to_owned()),
                ("TA-Integration-Version", LIB_VERSION.to_owned()),
                ("TA-Integration-Count", batch.len().to_string()),
            ],
            body,
        };

        let response = self.transport.post(request).await?;
        check_response(&response, "code")
    }
}

fn gzip(content: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content)?;
    encoder.finish()
}
