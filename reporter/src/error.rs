use thiserror::Error;

/// Errors handed to operation callbacks.
///
/// The `Display` strings of the validation variants are part of the public contract: callers
/// match on them the same way across every SDK flavour, so they must not be reworded.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("account ID and distinct ID cannot be empty at the same time")]
    MissingIdentity,
    #[error("invalid event name")]
    InvalidEventName,
    #[error("invalid properties")]
    InvalidProperties,
    #[error("eventId cannot be empty")]
    MissingEventId,
    #[error("firstCheckId cannot be empty")]
    MissingFirstCheckId,
    #[error("invalid property name: {0}")]
    InvalidPropertyName(String),

    #[error("invalid super properties")]
    InvalidSuperProperties,
    #[error("invalid dynamic super properties")]
    InvalidDynamicSuperProperties,

    #[error("failed to deliver events: {0}")]
    Delivery(#[from] DeliveryError),
    #[error("consumer is closed")]
    Closed,
}

impl ReportError {
    /// Short label used for the rejection metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ReportError::MissingIdentity => "missing_identity",
            ReportError::InvalidEventName => "invalid_event_name",
            ReportError::InvalidProperties => "invalid_properties",
            ReportError::MissingEventId => "missing_event_id",
            ReportError::MissingFirstCheckId => "missing_first_check_id",
            ReportError::InvalidPropertyName(_) => "invalid_property_name",
            ReportError::InvalidSuperProperties => "invalid_super_properties",
            ReportError::InvalidDynamicSuperProperties => "invalid_dynamic_super_properties",
            ReportError::Delivery(_) => "delivery",
            ReportError::Closed => "closed",
        }
    }
}

/// Enumeration of the ways a record or batch can fail to reach its destination.
/// None of these are retried: by the time they surface the records are gone.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status code: {0}")]
    UnexpectedStatus(u16),
    #[error("unexpected result code: {code}, msg: {message}")]
    UnexpectedCode { code: i64, message: String },
    #[error("could not parse response from receiver: {0}")]
    MalformedResponse(String),
    #[error("failed to serialize record: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("failed to encode form body: {0}")]
    Form(#[from] serde_urlencoded::ser::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while constructing a client or one of its consumers.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid server url: {0}")]
    InvalidServerUrl(#[from] url::ParseError),
    #[error("unsupported url protocol: {0}")]
    UnsupportedScheme(String),
    #[error("missing required configuration: {0}")]
    MissingField(&'static str),
    #[error("{0} is not a valid consumer mode")]
    InvalidMode(String),
    #[error("the asynchronous batch consumer must be created within a tokio runtime")]
    MissingRuntime,
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("failed to prepare log directory: {0}")]
    LogDirectory(#[source] std::io::Error),
}
