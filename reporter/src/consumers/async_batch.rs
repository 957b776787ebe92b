use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::AsyncBatchConfig;
use crate::consumer::{complete, serialize, BatchSender, Consumer, EventBuffer};
use crate::error::{ConfigError, ReportError};
use crate::event::Callback;
use crate::record::WireRecord;
use crate::transport::{HttpTransport, Transport};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

struct Shared {
    sender: BatchSender,
    buffer: EventBuffer,
}

impl Shared {
    async fn send(&self, batch: Vec<String>) -> Result<(), ReportError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.sender.send(batch).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), ReportError> {
        self.send(self.buffer.take()).await
    }
}

/// Buffers records in memory and sends them from background tasks: a recurring timer flushes
/// whatever is waiting, and a full buffer is sent without blocking the caller.
///
/// Must be constructed inside a tokio runtime, which hosts the timer until `close`.
pub struct AsyncBatchConsumer {
    shared: Arc<Shared>,
    batch_size: usize,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl AsyncBatchConsumer {
    pub fn new(
        server_url: &str,
        app_id: &str,
        config: AsyncBatchConfig,
    ) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(server_url, config.request_timeout)?;
        Self::with_transport(Arc::new(transport), app_id, config)
    }

    pub fn with_transport(
        transport: Arc<dyn Transport + Send + Sync>,
        app_id: &str,
        config: AsyncBatchConfig,
    ) -> Result<Self, ConfigError> {
        if app_id.is_empty() {
            return Err(ConfigError::MissingField("app_id"));
        }
        let runtime = Handle::try_current().map_err(|_| ConfigError::MissingRuntime)?;

        let shared = Arc::new(Shared {
            sender: BatchSender::new(transport, app_id.to_owned(), config.compress),
            buffer: EventBuffer::default(),
        });

        let period = config.interval.max(MIN_INTERVAL);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let timer = runtime.spawn(run_timer(shared.clone(), period, shutdown_rx));

        let batch_size = config.batch_size.max(1);
        info!(
            batch_size,
            interval_ms = period.as_millis() as u64,
            compress = config.compress,
            "async batch consumer ready"
        );

        Ok(Self {
            shared,
            batch_size,
            shutdown: Mutex::new(Some(shutdown_tx)),
            timer: Mutex::new(Some(timer)),
            in_flight: Mutex::new(Vec::new()),
        })
    }

    /// Number of records waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.shared.buffer.len()
    }

    /// Buffer `event`. A full buffer is sent in the background, completing `callback` once it
    /// is delivered.
    ///
    /// The in-flight lock is held across the push, so `close` never misses a send for a batch
    /// drained before the buffer was closed.
    fn enqueue(&self, event: String, callback: Option<Callback>) {
        let mut in_flight = lock(&self.in_flight, "in-flight");
        let batch = match self.shared.buffer.push(event, self.batch_size) {
            Ok(Some(batch)) => batch,
            Ok(None) => return complete(callback, Ok(())),
            Err(e) => return complete(callback, Err(e)),
        };

        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            let result = shared.send(batch).await;
            complete(callback, result);
        });
        in_flight.retain(|task| !task.is_finished());
        in_flight.push(handle);
    }

    async fn stop_timer(&self) {
        if let Some(shutdown) = lock(&self.shutdown, "shutdown").take() {
            // The receiver is gone only if the timer already exited.
            let _ = shutdown.send(());
        }

        let timer = lock(&self.timer, "timer").take();
        if let Some(timer) = timer {
            if let Err(e) = timer.await {
                error!("flush timer task failed: {}", e);
            }
        }
    }

    async fn wait_in_flight(&self) {
        let tasks = std::mem::take(&mut *lock(&self.in_flight, "in-flight"));
        for task in tasks {
            if let Err(e) = task.await {
                error!("background flush task failed: {}", e);
            }
        }
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("poisoned {} mutex", name);
        poisoned.into_inner()
    })
}

async fn run_timer(shared: Arc<Shared>, period: Duration, mut shutdown: oneshot::Receiver<()>) {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {
                if let Err(e) = shared.flush().await {
                    warn!("timed flush failed: {}", e);
                }
            }
        }
    }
    debug!("flush timer stopped");
}

#[async_trait]
impl Consumer for AsyncBatchConsumer {
    async fn add(&self, record: WireRecord, callback: Option<Callback>) {
        let event = match serialize(&record) {
            Ok(event) => event,
            Err(e) => return complete(callback, Err(e)),
        };
        debug!(event = %event, "enqueue data");

        self.enqueue(event, callback);
    }

    async fn flush(&self, callback: Option<Callback>) {
        let result = self.shared.flush().await;
        complete(callback, result);
    }

    /// Stops the timer before the final flush, so nothing is sent after this returns.
    async fn close(&self, callback: Option<Callback>) {
        let Some(remaining) = self.shared.buffer.close() else {
            return complete(callback, Ok(()));
        };

        self.stop_timer().await;
        self.wait_in_flight().await;
        let result = self.shared.send(remaining).await;
        info!("async batch consumer closed");
        complete(callback, result);
    }
}
