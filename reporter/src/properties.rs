use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::{Number, Value};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

/// Property maps keep their keys sorted so serialized records are stable.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Canonical wire representation of every date: `YYYY-MM-DD HH:mm:ss.SSS`.
const DATE_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
);

/// Any value a caller can attach to an event.
///
/// `Date` only exists between the caller and the normalizer: records are rewritten so that
/// every date becomes a formatted string before they are handed to a consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Not a legal property value, stripped by validation.
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Date(OffsetDateTime),
    Array(Vec<PropertyValue>),
    Object(Properties),
}

impl PropertyValue {
    /// Legal values are everything but `Null`.
    pub fn is_legal(&self) -> bool {
        !matches!(self, PropertyValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Properties> {
        match self {
            PropertyValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Replace every `Date` in this tree with its formatted string.
    pub fn rewrite_dates(&mut self) {
        match self {
            PropertyValue::Date(date) => *self = PropertyValue::String(format_date(date)),
            PropertyValue::Array(items) => items.iter_mut().for_each(PropertyValue::rewrite_dates),
            PropertyValue::Object(map) => rewrite_dates(map),
            _ => {}
        }
    }

    pub fn contains_date(&self) -> bool {
        match self {
            PropertyValue::Date(_) => true,
            PropertyValue::Array(items) => items.iter().any(PropertyValue::contains_date),
            PropertyValue::Object(map) => map.values().any(PropertyValue::contains_date),
            _ => false,
        }
    }
}

/// Format a date with the wire pattern, keeping the offset the date carries.
pub fn format_date(date: &OffsetDateTime) -> String {
    date.format(DATE_FORMAT).unwrap_or_else(|e| {
        tracing::warn!("failed to format date {}: {}", date, e);
        date.to_string()
    })
}

/// Walk a property map and rewrite every nested date in place.
pub fn rewrite_dates(properties: &mut Properties) {
    properties
        .values_mut()
        .for_each(PropertyValue::rewrite_dates);
}

/// Build a property map from a JSON object. Returns `None` for any other JSON value.
pub fn from_json(value: Value) -> Option<Properties> {
    match PropertyValue::from(value) {
        PropertyValue::Object(map) => Some(map),
        _ => None,
    }
}

impl Serialize for PropertyValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            PropertyValue::Null => serializer.serialize_unit(),
            PropertyValue::Bool(value) => serializer.serialize_bool(*value),
            PropertyValue::Number(value) => value.serialize(serializer),
            PropertyValue::String(value) => serializer.serialize_str(value),
            PropertyValue::Date(value) => serializer.serialize_str(&format_date(value)),
            PropertyValue::Array(items) => items.serialize(serializer),
            PropertyValue::Object(map) => map.serialize(serializer),
        }
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(value) => PropertyValue::Bool(value),
            Value::Number(value) => PropertyValue::Number(value),
            Value::String(value) => PropertyValue::String(value),
            Value::Array(items) => {
                PropertyValue::Array(items.into_iter().map(PropertyValue::from).collect())
            }
            Value::Object(map) => PropertyValue::Object(
                map.into_iter()
                    .map(|(key, value)| (key, PropertyValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Number(value.into())
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Number(value.into())
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        PropertyValue::Number(value.into())
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        PropertyValue::Number(value.into())
    }
}

/// Non-finite floats have no JSON representation and become `Null`, which validation strips.
impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(PropertyValue::Null, PropertyValue::Number)
    }
}

impl From<OffsetDateTime> for PropertyValue {
    fn from(value: OffsetDateTime) -> Self {
        PropertyValue::Date(value)
    }
}

impl From<Properties> for PropertyValue {
    fn from(value: Properties) -> Self {
        PropertyValue::Object(value)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(value: Vec<T>) -> Self {
        PropertyValue::Array(value.into_iter().map(Into::into).collect())
    }
}
