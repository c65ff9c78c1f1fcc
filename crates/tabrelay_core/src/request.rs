use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::Params;

/// Controller-level actions accepted from triggers and the HTTP `/execute` route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestAction {
    StartSearch,
    StartTask,
    ListPlatforms,
    Ping,
}

impl RequestAction {
    pub const ALL: [RequestAction; 4] = [
        RequestAction::StartSearch,
        RequestAction::StartTask,
        RequestAction::ListPlatforms,
        RequestAction::Ping,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == raw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestAction::StartSearch => "start_search",
            RequestAction::StartTask => "start_task",
            RequestAction::ListPlatforms => "list_platforms",
            RequestAction::Ping => "ping",
        }
    }

    pub fn runs_task(&self) -> bool {
        matches!(self, RequestAction::StartSearch | RequestAction::StartTask)
    }
}

impl fmt::Display for RequestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to run (or inspect) tasks. Unknown keys are kept in `extra` and
/// passed through to the task as parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskRequest {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(flatten)]
    pub extra: Params,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("unknown action {0:?}")]
    UnknownAction(String),
    #[error("query is required")]
    MissingQuery,
    #[error("malformed request: {0}")]
    Malformed(String),
}

impl TaskRequest {
    pub fn new(action: RequestAction, query: Option<&str>, platform: Option<&str>) -> Self {
        Self {
            action: action.as_str().to_string(),
            query: query.map(str::to_string),
            platform: platform.map(str::to_string),
            extra: Params::new(),
        }
    }

    pub fn from_value(value: Value) -> Result<Self, RequestError> {
        serde_json::from_value(value).map_err(|err| RequestError::Malformed(err.to_string()))
    }

    pub fn action(&self) -> Result<RequestAction, RequestError> {
        RequestAction::parse(&self.action)
            .ok_or_else(|| RequestError::UnknownAction(self.action.clone()))
    }

    /// The trimmed query; blank counts as missing.
    pub fn query(&self) -> Result<&str, RequestError> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or(RequestError::MissingQuery)
    }

    /// Per-call override of the configured item cap.
    pub fn max_items(&self) -> Option<usize> {
        self.extra
            .get("max_items")
            .and_then(Value::as_u64)
            .filter(|n| *n > 0)
            .map(|n| n as usize)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    #[error("Empty message")]
    Empty,
    #[error("Invalid format. Use 'action:query' or 'action:query:platform'")]
    InvalidFormat,
    #[error("Unknown action {0:?}")]
    UnknownAction(String),
}

/// Parse one `action:query` or `action:query:platform` trigger line.
pub fn parse_trigger_line(line: &str) -> Result<TaskRequest, TriggerError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(TriggerError::Empty);
    }

    let parts: Vec<&str> = line.split(':').collect();
    let (action, query, platform) = match parts.as_slice() {
        [action, query] => (*action, *query, None),
        [action, query, platform] => (*action, *query, Some(*platform)),
        _ => return Err(TriggerError::InvalidFormat),
    };

    let action = RequestAction::parse(action.trim())
        .ok_or_else(|| TriggerError::UnknownAction(action.trim().to_string()))?;
    let platform = platform.map(str::trim).filter(|p| !p.is_empty());
    Ok(TaskRequest::new(action, Some(query), platform))
}
