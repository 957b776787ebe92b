//! Caller-facing event descriptions.
//!
//! Requests are plain structs with builder-style setters. They are consumed by the matching
//! [`Analytics`](crate::Analytics) operation and never outlive that call.
use time::OffsetDateTime;

use crate::error::ReportError;
use crate::properties::{Properties, PropertyValue};

/// Completion callback invoked with the outcome of an operation.
pub type Callback = Box<dyn FnOnce(Result<(), ReportError>) + Send + 'static>;

/// Everything the normalizer needs to build a record, independent of the request flavour.
#[derive(Default)]
pub(crate) struct RecordInput {
    pub account_id: Option<String>,
    pub distinct_id: Option<String>,
    pub event_name: Option<String>,
    pub event_id: Option<String>,
    pub first_check_id: Option<String>,
    pub time: Option<OffsetDateTime>,
    pub ip: Option<String>,
    pub uuid: Option<String>,
    pub app_id: Option<String>,
    pub properties: Option<Properties>,
}

/// An ordinary track event.
#[derive(Default)]
pub struct TrackEvent {
    pub account_id: Option<String>,
    pub distinct_id: Option<String>,
    pub event: Option<String>,
    /// Event time, defaults to now.
    pub time: Option<OffsetDateTime>,
    pub ip: Option<String>,
    /// Caller-chosen record id, generated when absent.
    pub uuid: Option<String>,
    pub app_id: Option<String>,
    pub properties: Option<Properties>,
    pub callback: Option<Callback>,
}

impl TrackEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            ..Default::default()
        }
    }

    pub fn account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn distinct_id(mut self, distinct_id: impl Into<String>) -> Self {
        self.distinct_id = Some(distinct_id.into());
        self
    }

    pub fn time(mut self, time: OffsetDateTime) -> Self {
        self.time = Some(time);
        self
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Set a single property, creating the map if needed.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties
            .get_or_insert_with(Properties::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn on_complete(
        mut self,
        callback: impl FnOnce(Result<(), ReportError>) + Send + 'static,
    ) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub(crate) fn into_parts(self) -> (RecordInput, Option<Callback>) {
        let input = RecordInput {
            account_id: self.account_id,
            distinct_id: self.distinct_id,
            event_name: self.event,
            time: self.time,
            ip: self.ip,
            uuid: self.uuid,
            app_id: self.app_id,
            properties: self.properties,
            ..Default::default()
        };
        (input, self.callback)
    }
}

/// A track event the backend keeps only once per `first_check_id`.
#[derive(Default)]
pub struct TrackFirstEvent {
    pub track: TrackEvent,
    pub first_check_id: Option<String>,
}

impl TrackFirstEvent {
    pub fn new(track: TrackEvent, first_check_id: impl Into<String>) -> Self {
        Self {
            track,
            first_check_id: Some(first_check_id.into()),
        }
    }
}

/// A track event whose properties can later be partially updated through `event_id`.
#[derive(Default)]
pub struct TrackUpdateEvent {
    pub track: TrackEvent,
    pub event_id: Option<String>,
}

impl TrackUpdateEvent {
    pub fn new(track: TrackEvent, event_id: impl Into<String>) -> Self {
        Self {
            track,
            event_id: Some(event_id.into()),
        }
    }
}

/// A track event whose properties can later be replaced wholesale through `event_id`.
#[derive(Default)]
pub struct TrackOverwriteEvent {
    pub track: TrackEvent,
    pub event_id: Option<String>,
}

impl TrackOverwriteEvent {
    pub fn new(track: TrackEvent, event_id: impl Into<String>) -> Self {
        Self {
            track,
            event_id: Some(event_id.into()),
        }
    }
}

/// A user profile mutation: set, set-once, add, append, unique-append or delete.
#[derive(Default)]
pub struct UserEvent {
    pub account_id: Option<String>,
    pub distinct_id: Option<String>,
    pub time: Option<OffsetDateTime>,
    pub uuid: Option<String>,
    pub app_id: Option<String>,
    pub properties: Option<Properties>,
    pub callback: Option<Callback>,
}

impl UserEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn distinct_id(mut self, distinct_id: impl Into<String>) -> Self {
        self.distinct_id = Some(distinct_id.into());
        self
    }

    pub fn time(mut self, time: OffsetDateTime) -> Self {
        self.time = Some(time);
        self
    }

    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties
            .get_or_insert_with(Properties::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn on_complete(
        mut self,
        callback: impl FnOnce(Result<(), ReportError>) + Send + 'static,
    ) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub(crate) fn into_parts(self) -> (RecordInput, Option<Callback>) {
        let input = RecordInput {
            account_id: self.account_id,
            distinct_id: self.distinct_id,
            time: self.time,
            uuid: self.uuid,
            app_id: self.app_id,
            properties: self.properties,
            ..Default::default()
        };
        (input, self.callback)
    }
}

/// Removes a single user property.
#[derive(Default)]
pub struct UserUnsetEvent {
    pub account_id: Option<String>,
    pub distinct_id: Option<String>,
    pub property: String,
    pub app_id: Option<String>,
    pub callback: Option<Callback>,
}

impl UserUnsetEvent {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ..Default::default()
        }
    }

    pub fn account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn distinct_id(mut self, distinct_id: impl Into<String>) -> Self {
        self.distinct_id = Some(distinct_id.into());
        self
    }

    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn on_complete(
        mut self,
        callback: impl FnOnce(Result<(), ReportError>) + Send + 'static,
    ) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// The record payload is always `{ <property>: 0 }`.
    pub(crate) fn into_parts(self) -> (RecordInput, Option<Callback>) {
        let input = RecordInput {
            account_id: self.account_id,
            distinct_id: self.distinct_id,
            app_id: self.app_id,
            properties: Some(Properties::from([(self.property, PropertyValue::from(0))])),
            ..Default::default()
        };
        (input, self.callback)
    }
}
