//! In-memory doubles for the transport, file and consumer collaborators.
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use serde_json::Value;

use crate::consumer::Consumer;
use crate::error::{DeliveryError, ReportError};
use crate::event::Callback;
use crate::properties::Properties;
use crate::record::{EventType, WireRecord};
use crate::rotation::LineWriter;
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// Records every request and answers with a canned response.
#[derive(Clone)]
pub struct RecordingTransport {
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    reply: Option<(u16, String)>,
}

impl RecordingTransport {
    pub fn ok() -> Self {
        Self::responding(200, r#"{"code":0,"errorLevel":0}"#)
    }

    pub fn responding(status: u16, body: &str) -> Self {
        Self {
            requests: Arc::default(),
            reply: Some((status, body.to_owned())),
        }
    }

    /// Fails every request as if the receiver were unreachable.
    pub fn refusing() -> Self {
        Self {
            requests: Arc::default(),
            reply: None,
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, DeliveryError> {
        self.requests.lock().unwrap().push(request);
        match &self.reply {
            Some((status, body)) => Ok(HttpResponse {
                status: *status,
                body: Bytes::from(body.clone()),
            }),
            None => Err(DeliveryError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
        }
    }
}

/// Decode a batch request body into its records, inflating it when needed.
pub fn decode_batch(request: &HttpRequest) -> Vec<Value> {
    let gzipped = request
        .headers
        .iter()
        .any(|(name, value)| *name == "compress" && value == "gzip");

    let content = if gzipped {
        let mut decoder = GzDecoder::new(&request.body[..]);
        let mut content = String::new();
        decoder.read_to_string(&mut content).unwrap();
        content
    } else {
        String::from_utf8(request.body.to_vec()).unwrap()
    };

    serde_json::from_str(&content).unwrap()
}

#[derive(Clone, Default)]
pub struct MemoryWriter {
    lines: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryWriter {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl LineWriter for MemoryWriter {
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.lines.lock().unwrap().push(line.to_owned());
        Ok(())
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Collects callback outcomes, with errors rendered through `Display`.
#[derive(Clone, Default)]
pub struct CallbackRecorder {
    results: Arc<Mutex<Vec<Result<(), String>>>>,
}

impl CallbackRecorder {
    pub fn callback(&self) -> Callback {
        let results = self.results.clone();
        Box::new(move |result: Result<(), ReportError>| {
            results
                .lock()
                .unwrap()
                .push(result.map_err(|e| e.to_string()));
        })
    }

    pub fn results(&self) -> Vec<Result<(), String>> {
        self.results.lock().unwrap().clone()
    }
}

/// Keeps every record it is handed, acknowledging each one.
#[derive(Clone, Default)]
pub struct RecordingConsumer {
    records: Arc<Mutex<Vec<WireRecord>>>,
    flushes: Arc<Mutex<usize>>,
    closed: Arc<AtomicBool>,
}

impl RecordingConsumer {
    pub fn records(&self) -> Vec<WireRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn flushes(&self) -> usize {
        *self.flushes.lock().unwrap()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Consumer for RecordingConsumer {
    async fn add(&self, record: WireRecord, callback: Option<Callback>) {
        self.records.lock().unwrap().push(record);
        if let Some(callback) = callback {
            callback(Ok(()));
        }
    }

    async fn flush(&self, callback: Option<Callback>) {
        *self.flushes.lock().unwrap() += 1;
        if let Some(callback) = callback {
            callback(Ok(()));
        }
    }

    async fn close(&self, callback: Option<Callback>) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(callback) = callback {
            callback(Ok(()));
        }
    }
}

/// A minimal record as the normalizer would produce it.
pub fn record(event_type: EventType, event_name: &str) -> WireRecord {
    WireRecord {
        event_type,
        time: "2024-05-06 07:08:09.010".to_owned(),
        distinct_id: Some("device".to_owned()),
        account_id: None,
        ip: None,
        event_name: Some(event_name.to_owned()),
        event_id: None,
        first_check_id: None,
        uuid: "00000000-0000-4000-8000-000000000000".to_owned(),
        app_id: None,
        properties: Properties::new(),
    }
}
