pub mod client;
pub mod config;
pub mod consumer;
pub mod consumers;
pub mod error;
pub mod event;
pub mod properties;
pub mod record;
pub mod rotation;
pub mod time;
pub mod transport;
pub mod validation;

#[cfg(test)]
mod test_utils;

pub use client::Analytics;
pub use config::{AsyncBatchConfig, BatchConfig, Config, ConsumerMode, DebugConfig, LoggingConfig};
pub use consumer::Consumer;
pub use error::{ConfigError, DeliveryError, ReportError};
pub use event::{
    Callback, TrackEvent, TrackFirstEvent, TrackOverwriteEvent, TrackUpdateEvent, UserEvent,
    UserUnsetEvent,
};
pub use properties::{Properties, PropertyValue};
pub use validation::{IllegalValuePolicy, ValidationConfig};
