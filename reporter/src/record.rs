use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::event::RecordInput;
use crate::properties::{format_date, rewrite_dates, Properties, PropertyValue};
use crate::time::TimeSource;

pub const LIB_NAME: &str = "rust";
pub const LIB_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns a fresh set of super properties on every call.
pub type DynamicPropertiesProvider = Arc<dyn Fn() -> Properties + Send + Sync>;

/// Value of the `#type` reserved key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    /// Ordinary and first-check track events share this type.
    #[serde(rename = "track")]
    Track,
    #[serde(rename = "track_update")]
    TrackUpdate,
    #[serde(rename = "track_overwrite")]
    TrackOverwrite,
    #[serde(rename = "user_set")]
    UserSet,
    #[serde(rename = "user_setOnce")]
    UserSetOnce,
    #[serde(rename = "user_add")]
    UserAdd,
    #[serde(rename = "user_append")]
    UserAppend,
    #[serde(rename = "user_uniq_append")]
    UserUniqAppend,
    #[serde(rename = "user_unset")]
    UserUnset,
    #[serde(rename = "user_del")]
    UserDel,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Track => "track",
            EventType::TrackUpdate => "track_update",
            EventType::TrackOverwrite => "track_overwrite",
            EventType::UserSet => "user_set",
            EventType::UserSetOnce => "user_setOnce",
            EventType::UserAdd => "user_add",
            EventType::UserAppend => "user_append",
            EventType::UserUniqAppend => "user_uniq_append",
            EventType::UserUnset => "user_unset",
            EventType::UserDel => "user_del",
        }
    }

    /// Track-family records carry library defaults and super properties.
    pub fn is_track(&self) -> bool {
        matches!(
            self,
            EventType::Track | EventType::TrackUpdate | EventType::TrackOverwrite
        )
    }
}

/// The canonical record handed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireRecord {
    #[serde(rename = "#type")]
    pub event_type: EventType,
    #[serde(rename = "#time")]
    pub time: String,
    #[serde(rename = "#distinct_id", skip_serializing_if = "Option::is_none")]
    pub distinct_id: Option<String>,
    #[serde(rename = "#account_id", skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(rename = "#ip", skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(rename = "#event_name", skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(rename = "#event_id", skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(rename = "#first_check_id", skip_serializing_if = "Option::is_none")]
    pub first_check_id: Option<String>,
    #[serde(rename = "#uuid")]
    pub uuid: String,
    #[serde(rename = "#app_id", skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    pub properties: Properties,
}

impl WireRecord {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Builds wire records from validated requests.
#[derive(Clone)]
pub struct EventNormalizer {
    timesource: Arc<dyn TimeSource + Send + Sync>,
}

fn library_defaults() -> Properties {
    Properties::from([
        ("#lib".to_owned(), PropertyValue::from(LIB_NAME)),
        ("#lib_version".to_owned(), PropertyValue::from(LIB_VERSION)),
    ])
}

/// Empty strings count as absent, so they never reach the wire as reserved keys.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl EventNormalizer {
    pub fn new(timesource: Arc<dyn TimeSource + Send + Sync>) -> Self {
        Self { timesource }
    }

    /// Build a record. Precedence of properties, lowest first: library defaults, super
    /// properties, dynamic super properties, request properties. Only track-family records
    /// receive the first three layers.
    pub(crate) fn build(
        &self,
        event_type: EventType,
        input: RecordInput,
        super_properties: &Properties,
        dynamic: Option<&DynamicPropertiesProvider>,
    ) -> WireRecord {
        let time = input.time.unwrap_or_else(|| self.timesource.now());

        let mut properties = if event_type.is_track() {
            let mut merged = library_defaults();
            merged.extend(super_properties.clone());
            if let Some(provider) = dynamic {
                merged.extend(provider());
            }
            merged
        } else {
            Properties::new()
        };

        if let Some(request_properties) = input.properties.filter(|p| !p.is_empty()) {
            properties.extend(request_properties);
        }

        rewrite_dates(&mut properties);

        WireRecord {
            event_type,
            time: format_date(&time),
            distinct_id: present(input.distinct_id),
            account_id: present(input.account_id),
            ip: present(input.ip),
            event_name: present(input.event_name),
            event_id: present(input.event_id),
            first_check_id: present(input.first_check_id),
            uuid: present(input.uuid).unwrap_or_else(|| Uuid::new_v4().to_string()),
            app_id: present(input.app_id),
            properties,
        }
    }
}
