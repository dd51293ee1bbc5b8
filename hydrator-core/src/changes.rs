//! Partial document overlays produced by hydration attempts

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Key set on a change-set when hydration failed terminally.
pub const HYDRATION_ERRORED_KEY: &str = "hydration_errored";

/// Key carrying the terminal failure message.
pub const HYDRATION_ERROR_KEY: &str = "hydration_error";

/// A partial overlay applied against the document on the remote side.
///
/// Keys mirror the document sections (`document_type`, `metadata`, `data`,
/// `actions`) plus the terminal failure markers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet(pub Map<String, JsonValue>);

impl ChangeSet {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: JsonValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// Build the change-set recorded for a terminally failed hydration.
    pub fn hydration_failure(message: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert(HYDRATION_ERRORED_KEY.to_string(), JsonValue::Bool(true));
        map.insert(
            HYDRATION_ERROR_KEY.to_string(),
            JsonValue::String(message.into()),
        );
        Self(map)
    }

    /// Whether this change-set records a terminal hydration failure.
    pub fn is_hydration_failure(&self) -> bool {
        matches!(
            self.0.get(HYDRATION_ERRORED_KEY),
            Some(JsonValue::Bool(true))
        )
    }

    /// Drop keys whose value carries no information for the remote side.
    ///
    /// A key is removed when its value is an empty array or an empty
    /// object. Timestamp values are kept unconditionally: a date is never
    /// empty, whatever its representation.
    pub fn sanitized(mut self) -> Self {
        self.0.retain(|_, value| !is_discardable(value));
        self
    }
}

impl From<Map<String, JsonValue>> for ChangeSet {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

fn is_discardable(value: &JsonValue) -> bool {
    if is_timestamp(value) {
        return false;
    }
    match value {
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(entries) => entries.is_empty(),
        _ => false,
    }
}

fn is_timestamp(value: &JsonValue) -> bool {
    value
        .as_str()
        .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn changes(value: JsonValue) -> ChangeSet {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_sanitize_drops_empty_collections() {
        let sanitized = changes(json!({
            "metadata": {"title": "report"},
            "data": {},
            "actions": [],
            "document_type": "document"
        }))
        .sanitized();

        assert_eq!(sanitized.get("metadata"), Some(&json!({"title": "report"})));
        assert_eq!(sanitized.get("document_type"), Some(&json!("document")));
        assert!(sanitized.get("data").is_none());
        assert!(sanitized.get("actions").is_none());
    }

    #[test]
    fn test_sanitize_keeps_nonempty_collections() {
        let sanitized = changes(json!({
            "actions": ["reindex"],
            "data": {"pages": 3}
        }))
        .sanitized();

        assert_eq!(sanitized.0.len(), 2);
    }

    #[test]
    fn test_sanitize_keeps_timestamps() {
        let sanitized = changes(json!({
            "metadata": {"title": "x"},
            "creation_date": "2023-04-01T08:30:00Z",
            "stale": {}
        }))
        .sanitized();

        assert_eq!(
            sanitized.get("creation_date"),
            Some(&json!("2023-04-01T08:30:00Z"))
        );
        assert!(sanitized.get("stale").is_none());
    }

    #[test]
    fn test_hydration_failure_shape() {
        let failure = ChangeSet::hydration_failure("Corrupted file");

        assert!(failure.is_hydration_failure());
        assert_eq!(failure.get(HYDRATION_ERROR_KEY), Some(&json!("Corrupted file")));
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({"hydration_errored": true, "hydration_error": "Corrupted file"})
        );
    }

    #[test]
    fn test_regular_changes_are_not_failures() {
        assert!(!changes(json!({"metadata": {"a": 1}})).is_hydration_failure());
    }
}
