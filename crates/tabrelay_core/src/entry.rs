use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One line of a run's result file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StorageEntry {
    Item {
        platform: String,
        timestamp: String,
        data: Value,
    },
    Summary {
        platform: String,
        timestamp: String,
        data: Value,
    },
    Error {
        platform: String,
        timestamp: String,
        error: Value,
    },
    Progress {
        platform: String,
        timestamp: String,
        data: Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryKind {
    Item,
    Summary,
    Error,
    Progress,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntryKind::Item => "item",
            EntryKind::Summary => "summary",
            EntryKind::Error => "error",
            EntryKind::Progress => "progress",
        };
        f.write_str(label)
    }
}

impl StorageEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            StorageEntry::Item { .. } => EntryKind::Item,
            StorageEntry::Summary { .. } => EntryKind::Summary,
            StorageEntry::Error { .. } => EntryKind::Error,
            StorageEntry::Progress { .. } => EntryKind::Progress,
        }
    }

    pub fn platform(&self) -> &str {
        match self {
            StorageEntry::Item { platform, .. }
            | StorageEntry::Summary { platform, .. }
            | StorageEntry::Error { platform, .. }
            | StorageEntry::Progress { platform, .. } => platform,
        }
    }

    pub fn timestamp(&self) -> &str {
        match self {
            StorageEntry::Item { timestamp, .. }
            | StorageEntry::Summary { timestamp, .. }
            | StorageEntry::Error { timestamp, .. }
            | StorageEntry::Progress { timestamp, .. } => timestamp,
        }
    }

    /// The payload regardless of kind (`error` for error entries, `data` otherwise).
    pub fn payload(&self) -> &Value {
        match self {
            StorageEntry::Item { data, .. }
            | StorageEntry::Summary { data, .. }
            | StorageEntry::Progress { data, .. } => data,
            StorageEntry::Error { error, .. } => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entries_are_tagged_by_status() {
        let entry = StorageEntry::Error {
            platform: "duckduckgo".into(),
            timestamp: "2024-01-01T00:00:00+00:00".into(),
            error: json!({"code": "TIMEOUT"}),
        };
        let line = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            line,
            json!({
                "status": "error",
                "platform": "duckduckgo",
                "timestamp": "2024-01-01T00:00:00+00:00",
                "error": {"code": "TIMEOUT"}
            })
        );
        assert_eq!(entry.kind(), EntryKind::Error);
        assert_eq!(entry.payload()["code"], "TIMEOUT");
    }
}
