//! Hydration task and document types

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use url::Url;

/// A single hydration request handed to the engine by the external queue.
///
/// Immutable once dispatched; the engine never mutates a task, it only
/// produces a [`ChangeSet`](crate::ChangeSet) against `document`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydrationTask {
    /// Location of the downloaded file to hydrate.
    pub file_path: Url,

    /// Endpoint receiving the resulting change-set.
    pub callback: Url,

    /// Snapshot of the document as known at enqueue time.
    pub document: DocumentSnapshot,

    /// Queue priority, forwarded verbatim to the worker.
    #[serde(default)]
    pub priority: i64,
}

/// Snapshot of a document's hydratable sections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DocumentSnapshot {
    pub document_type: JsonValue,
    pub metadata: JsonValue,
    pub data: JsonValue,
    pub actions: JsonValue,
}

impl Default for DocumentSnapshot {
    fn default() -> Self {
        Self {
            document_type: empty_object(),
            metadata: empty_object(),
            data: empty_object(),
            actions: empty_object(),
        }
    }
}

fn empty_object() -> JsonValue {
    JsonValue::Object(serde_json::Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_deserialization_defaults_priority() {
        let task: HydrationTask = serde_json::from_value(json!({
            "file_path": "http://files.example.com/a.pdf",
            "callback": "http://api.example.com/documents/42",
            "document": {"metadata": {"title": "a"}}
        }))
        .unwrap();

        assert_eq!(task.priority, 0);
        assert_eq!(task.file_path.as_str(), "http://files.example.com/a.pdf");
        assert_eq!(task.document.metadata, json!({"title": "a"}));
        assert_eq!(task.document.data, json!({}));
    }

    #[test]
    fn test_document_snapshot_default_sections() {
        let snapshot = DocumentSnapshot::default();
        assert_eq!(snapshot.document_type, json!({}));
        assert_eq!(snapshot.actions, json!({}));
    }
}
