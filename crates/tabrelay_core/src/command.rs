use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type CommandId = u64;

/// Action parameters, flattened next to `id` and `action` on the wire.
pub type Params = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Navigate,
    Type,
    Click,
    WaitForSelector,
    ExtractUrls,
    #[serde(alias = "extract_search_results")]
    ExtractResults,
    ScrollToBottom,
    ProgressUpdate,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Navigate => "navigate",
            Action::Type => "type",
            Action::Click => "click",
            Action::WaitForSelector => "wait_for_selector",
            Action::ExtractUrls => "extract_urls",
            Action::ExtractResults => "extract_results",
            Action::ScrollToBottom => "scroll_to_bottom",
            Action::ProgressUpdate => "progress_update",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instruction for the agent. Immutable once the correlator has assigned its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,
    pub action: Action,
    #[serde(flatten)]
    pub params: Params,
}

impl Command {
    pub fn new(id: CommandId, action: Action, params: Params) -> Self {
        Self { id, action, params }
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Error,
}

/// The agent's answer to one [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub id: CommandId,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AgentResult {
    pub const TIMEOUT_MESSAGE: &'static str = "Timeout";

    pub fn success(id: CommandId, data: Option<Value>) -> Self {
        Self {
            id,
            status: ResultStatus::Success,
            data,
            message: None,
        }
    }

    pub fn error(id: CommandId, message: impl Into<String>) -> Self {
        Self {
            id,
            status: ResultStatus::Error,
            data: None,
            message: Some(message.into()),
        }
    }

    /// Synthetic result handed out when no reply arrived in time.
    pub fn timed_out(id: CommandId) -> Self {
        Self::error(id, Self::TIMEOUT_MESSAGE)
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    pub fn is_timeout(&self) -> bool {
        self.status == ResultStatus::Error
            && self.data.is_none()
            && self.message.as_deref() == Some(Self::TIMEOUT_MESSAGE)
    }

    /// `data` as a list, or empty when absent or not an array.
    pub fn data_list(&self) -> Vec<Value> {
        match &self.data {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }
}

/// A decoded message coming from the agent side of a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Answer to a command previously sent.
    Result(AgentResult),
    /// Reply-shaped message that did not decode as a result (kept for logging).
    MalformedResult { id: Option<CommandId>, raw: Value },
    /// Unsolicited browser-originated event (trigger, user action).
    Event(Value),
}

impl InboundFrame {
    /// Objects carrying an `id` key are results; everything else is an event.
    pub fn classify(value: Value) -> Self {
        let has_id = value.as_object().is_some_and(|obj| obj.contains_key("id"));
        if !has_id {
            return InboundFrame::Event(value);
        }
        match serde_json::from_value::<AgentResult>(value.clone()) {
            Ok(result) => InboundFrame::Result(result),
            Err(_) => InboundFrame::MalformedResult {
                id: value.get("id").and_then(Value::as_u64),
                raw: value,
            },
        }
    }
}
