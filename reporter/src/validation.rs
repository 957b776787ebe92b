use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::properties::Properties;

/// Event names and property keys: a letter, `#` or `_`, then at least one alphanumeric or `_`.
static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z#_][A-Za-z0-9_]+$").expect("name pattern is a valid regex"));

/// What to do with a property whose value is not a legal type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IllegalValuePolicy {
    /// Remove the offending key, warn, and carry on with the rest of the map.
    #[default]
    Drop,
    /// Remove the offending key and fail the properties check.
    Reject,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationConfig {
    /// Upper bound on account and distinct ids, in characters. Unbounded when `None`.
    pub max_identifier_length: Option<usize>,
    pub illegal_values: IllegalValuePolicy,
}

/// Stateless checks run by the client before any record is built.
///
/// Every check reports failures as `false` plus a `tracing` diagnostic; turning a failure
/// into an error for the caller is the client's job.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator {
    config: ValidationConfig,
}

/// True if `name` can be used as an event name or a property key.
pub fn is_valid_name(name: &str) -> bool {
    if NAME_PATTERN.is_match(name) {
        true
    } else {
        warn!(
            name,
            "event and property names must start with a letter, '#' or '_' and contain only letters, digits and '_'"
        );
        false
    }
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// A valid identifier is non-empty, fits on a single line and respects the configured length cap.
    pub fn is_valid_identifier(&self, id: Option<&str>) -> bool {
        let Some(id) = id else {
            return false;
        };

        if id.is_empty() || id.contains(['\n', '\r', '\u{2028}', '\u{2029}']) {
            debug!(id, "identifier is empty or spans several lines");
            return false;
        }

        match self.config.max_identifier_length {
            Some(max) if id.chars().count() > max => {
                warn!(id, max, "identifier exceeds the maximum length");
                false
            }
            _ => true,
        }
    }

    pub fn has_valid_user_identity(&self, account_id: Option<&str>, distinct_id: Option<&str>) -> bool {
        if self.is_valid_identifier(account_id) || self.is_valid_identifier(distinct_id) {
            true
        } else {
            warn!("account ID and distinct ID cannot be empty at the same time");
            false
        }
    }

    /// Remove every entry whose value is not a legal type. Returns how many entries were dropped.
    pub fn strip_illegal_properties(&self, properties: &mut Properties) -> usize {
        let before = properties.len();
        properties.retain(|key, value| {
            if value.is_legal() {
                true
            } else {
                warn!(
                    key = key.as_str(),
                    "dropping property: values must be a string, number, boolean, date, array or object"
                );
                false
            }
        });
        before - properties.len()
    }

    /// Properties are optional, but when present every key must be a valid name.
    pub fn are_properties_well_formed(&self, properties: Option<&mut Properties>) -> bool {
        match properties {
            None => true,
            Some(properties) => self.check_properties(properties),
        }
    }

    /// Properties must be present and non-empty after stripping, with every key a valid name.
    pub fn are_properties_required(&self, properties: Option<&mut Properties>) -> bool {
        let Some(properties) = properties else {
            warn!("properties are required for this operation");
            return false;
        };

        if !self.check_properties(properties) {
            return false;
        }
        if properties.is_empty() {
            warn!("properties must not be empty for this operation");
            return false;
        }
        true
    }

    fn check_properties(&self, properties: &mut Properties) -> bool {
        let dropped = self.strip_illegal_properties(properties);
        if dropped > 0 && self.config.illegal_values == IllegalValuePolicy::Reject {
            return false;
        }

        // Check every key so each offending one is reported.
        properties
            .keys()
            .map(|key| is_valid_name(key))
            .fold(true, |valid, key_valid| valid && key_valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::from_json;
    use serde_json::json;

    #[test]
    fn names_follow_the_key_syntax() {
        assert!(is_valid_name("ab"));
        assert!(is_valid_name("#lib"));
        assert!(is_valid_name("_private"));
        assert!(is_valid_name("Event_2"));

        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a"));
        assert!(!is_valid_name("1a"));
        assert!(!is_valid_name("with space"));
        assert!(!is_valid_name("dash-ed"));
    }

    #[test]
    fn identifiers_must_be_single_line_and_non_empty() {
        let validator = Validator::default();
        assert!(validator.is_valid_identifier(Some("user")));
        assert!(!validator.is_valid_identifier(Some("")));
        assert!(!validator.is_valid_identifier(Some("two\nlines")));
        assert!(!validator.is_valid_identifier(None));
    }

    #[test]
    fn identifier_length_cap_is_configurable() {
        let validator = Validator::new(ValidationConfig {
            max_identifier_length: Some(4),
            ..Default::default()
        });
        assert!(validator.is_valid_identifier(Some("abcd")));
        assert!(!validator.is_valid_identifier(Some("abcde")));
    }

    #[test]
    fn one_valid_identity_is_enough() {
        let validator = Validator::default();
        assert!(validator.has_valid_user_identity(Some("a"), None));
        assert!(validator.has_valid_user_identity(None, Some("d")));
        assert!(validator.has_valid_user_identity(Some(""), Some("d")));
        assert!(!validator.has_valid_user_identity(None, None));
        assert!(!validator.has_valid_user_identity(Some(""), Some("")));
    }

    #[test]
    fn illegal_values_are_dropped_by_default() {
        let validator = Validator::default();
        let mut properties = from_json(json!({"kept": 1, "gone": null})).unwrap();

        assert!(validator.are_properties_well_formed(Some(&mut properties)));
        assert_eq!(properties.len(), 1);
        assert!(properties.contains_key("kept"));
    }

    #[test]
    fn illegal_values_can_reject_the_whole_map() {
        let validator = Validator::new(ValidationConfig {
            illegal_values: IllegalValuePolicy::Reject,
            ..Default::default()
        });
        let mut properties = from_json(json!({"kept": 1, "gone": null})).unwrap();

        assert!(!validator.are_properties_well_formed(Some(&mut properties)));
    }

    #[test]
    fn absent_properties_are_well_formed_but_not_required() {
        let validator = Validator::default();
        assert!(validator.are_properties_well_formed(None));
        assert!(!validator.are_properties_required(None));
    }

    #[test]
    fn required_properties_must_survive_stripping() {
        let validator = Validator::default();
        let mut properties = from_json(json!({"only": null})).unwrap();
        assert!(!validator.are_properties_required(Some(&mut properties)));

        let mut properties = from_json(json!({})).unwrap();
        assert!(!validator.are_properties_required(Some(&mut properties)));

        let mut properties = from_json(json!({"age": 3})).unwrap();
        assert!(validator.are_properties_required(Some(&mut properties)));
    }

    #[test]
    fn bad_keys_fail_both_checks() {
        let validator = Validator::default();
        let mut properties = from_json(json!({"ok_key": 1, "9bad": 2})).unwrap();
        assert!(!validator.are_properties_well_formed(Some(&mut properties)));
        assert!(!validator.are_properties_required(Some(&mut properties)));
    }
}
