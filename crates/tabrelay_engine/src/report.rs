use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabrelay_core::StopReason;

use crate::error::{FailureKind, TaskError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: FailureKind,
    pub message: String,
}

impl From<&TaskError> for ErrorBody {
    fn from(err: &TaskError) -> Self {
        Self {
            code: err.kind,
            message: err.message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub query: String,
    pub total_items: usize,
    /// Zero-based index of the last page processed.
    pub pages_processed: u32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub duration_ms: u64,
    pub items_per_second: f64,
}

impl Performance {
    pub fn new(duration_ms: u64, items: usize) -> Self {
        let items_per_second = if duration_ms == 0 {
            0.0
        } else {
            items as f64 * 1000.0 / duration_ms as f64
        };
        Self {
            duration_ms,
            items_per_second,
        }
    }
}

/// Outcome of one dispatched task, in the shape returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskReport {
    Success {
        platform: String,
        action: String,
        results: Vec<Value>,
        summary: RunSummary,
        performance: Performance,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_file: Option<String>,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        platform: Option<String>,
        action: String,
        error: ErrorBody,
    },
}

impl TaskReport {
    pub fn failure(platform: Option<&str>, action: &str, err: &TaskError) -> Self {
        TaskReport::Error {
            platform: platform.map(str::to_string),
            action: action.to_string(),
            error: err.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskReport::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            TaskReport::Success { .. } => None,
            TaskReport::Error { error, .. } => Some(error.code),
        }
    }

    pub fn results(&self) -> &[Value] {
        match self {
            TaskReport::Success { results, .. } => results,
            TaskReport::Error { .. } => &[],
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
