use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::DebugConfig;
use crate::consumer::{complete, serialize, Consumer};
use crate::error::{ConfigError, DeliveryError, ReportError};
use crate::event::Callback;
use crate::record::WireRecord;
use crate::transport::{check_response, HttpRequest, HttpTransport, Transport};

const DEBUG_PATH: &str = "/data_debug";

/// Form body of a debug submission.
#[derive(Serialize)]
struct DebugForm<'a> {
    data: &'a str,
    source: &'static str,
    appid: &'a str,
    #[serde(rename = "dryRun")]
    dry_run: u8,
    #[serde(rename = "deviceId", skip_serializing_if = "Option::is_none")]
    device_id: Option<&'a str>,
}

/// Sends every record on its own to the receiver's validation endpoint, which reports
/// problems with the record instead of silently discarding it. Meant for integration work,
/// not production traffic.
pub struct DebugConsumer {
    transport: Arc<dyn Transport + Send + Sync>,
    app_id: String,
    config: DebugConfig,
    closed: AtomicBool,
}

impl DebugConsumer {
    pub fn new(server_url: &str, app_id: &str, config: DebugConfig) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(server_url, config.request_timeout)?;
        Self::with_transport(Arc::new(transport), app_id, config)
    }

    pub fn with_transport(
        transport: Arc<dyn Transport + Send + Sync>,
        app_id: &str,
        config: DebugConfig,
    ) -> Result<Self, ConfigError> {
        if app_id.is_empty() {
            return Err(ConfigError::MissingField("app_id"));
        }
        info!(dry_run = config.dry_run, "debug consumer ready");

        Ok(Self {
            transport,
            app_id: app_id.to_owned(),
            config,
            closed: AtomicBool::new(false),
        })
    }

    async fn send(&self, record: &WireRecord) -> Result<(), ReportError> {
        let data = serialize(record)?;
        debug!(data = %data, "sending debug record");

        let form = DebugForm {
            data: &data,
            source: "server",
            appid: &self.app_id,
            dry_run: u8::from(self.config.dry_run),
            device_id: self.config.device_id.as_deref(),
        };
        let body = serde_urlencoded::to_string(&form).map_err(DeliveryError::from)?;

        let request = HttpRequest {
            path: DEBUG_PATH,
            headers: vec![(
                "Content-Type",
                "application/x-www-form-urlencoded".to_owned(),
            )],
            body: Bytes::from(body),
        };

        let response = self.transport.post(request).await?;
        check_response(&response, "errorLevel")?;
        Ok(())
    }
}

#[async_trait]
impl Consumer for DebugConsumer {
    async fn add(&self, record: WireRecord, callback: Option<Callback>) {
        if self.closed.load(Ordering::SeqCst) {
            return complete(callback, Err(ReportError::Closed));
        }

        let result = self.send(&record).await;
        complete(callback, result);
    }

    async fn flush(&self, callback: Option<Callback>) {
        complete(callback, Ok(()));
    }

    async fn close(&self, callback: Option<Callback>) {
        self.closed.store(true, Ordering::SeqCst);
        info!("debug consumer closed");
        complete(callback, Ok(()));
    }
}
