use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use crate::error::{ConfigError, DeliveryError};
use crate::record::{LIB_NAME, LIB_VERSION};

/// A POST to one of the receiver endpoints.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Absolute path on the receiver, replacing any path of the configured server url.
    pub path: &'static str,
    pub headers: Vec<(&'static str, String)>,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Carries requests to the receiver. Implementations report connection-level failures only:
/// interpreting the status and body is left to the consumer.
#[async_trait]
pub trait Transport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, DeliveryError>;
}

/// `Transport` backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(server_url: &str, request_timeout: Duration) -> Result<Self, ConfigError> {
        let base_url = parse_server_url(server_url)?;

        let client = reqwest::Client::builder()
            .user_agent(format!("reporter-{}/{}", LIB_NAME, LIB_VERSION))
            .timeout(request_timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

/// Only plain and TLS http receivers are supported.
pub fn parse_server_url(server_url: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(server_url)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme(other.to_owned())),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, DeliveryError> {
        let mut url = self.base_url.clone();
        url.set_path(request.path);
        url.set_query(None);

        let builder = request
            .headers
            .iter()
            .fold(self.client.post(url), |builder, (name, value)| {
                builder.header(*name, value)
            });

        let response = builder.body(request.body).send().await.map_err(|e| {
            error!("http error: {}", e);
            DeliveryError::Request(e)
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(HttpResponse { status, body })
    }
}

/// Accept a receiver response: HTTP 200 and a JSON body whose `code_field` is `0`.
pub(crate) fn check_response(response: &HttpResponse, code_field: &str) -> Result<(), DeliveryError> {
    if response.status != 200 {
        error!("unexpected status code: {}", response.status);
        return Err(DeliveryError::UnexpectedStatus(response.status));
    }

    let result: Value = serde_json::from_slice(&response.body).map_err(|e| {
        error!("parse response error: {}", e);
        DeliveryError::MalformedResponse(e.to_string())
    })?;
    debug!(response = %result, "receiver response");

    let code = result
        .get(code_field)
        .and_then(Value::as_i64)
        .ok_or_else(|| DeliveryError::MalformedResponse(format!("missing `{}` field", code_field)))?;

    if code == 0 {
        return Ok(());
    }

    let message = result
        .get("msg")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| result.to_string());
    Err(DeliveryError::UnexpectedCode { code, message })
}
