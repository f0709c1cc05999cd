//! Push-channel wire format: the auth handshake and `update` envelopes.

use crate::error::{ChannelError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use solutioniq_api::{FileAttachment, parse_task_result};

/// Event kinds carried inside an `update` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    TaskCompleted,
    TaskFailed,
    BudgetAlert,
    TaskAwaitingApproval,
    MessageCreated,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskCompleted => "task.completed",
            Self::TaskFailed => "task.failed",
            Self::BudgetAlert => "budget.alert",
            Self::TaskAwaitingApproval => "task.awaiting_approval",
            Self::MessageCreated => "message.created",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::TaskCompleted | Self::TaskFailed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Decoded `result` of a terminal task event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventResult {
    pub content: String,
    pub files: Vec<FileAttachment>,
    pub lane: Option<String>,
    pub model: Option<String>,
    pub cost_usd: Option<f64>,
}

/// Typed event pushed by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    #[serde(rename = "task.completed")]
    TaskCompleted(EventPayload),
    #[serde(rename = "task.failed")]
    TaskFailed(EventPayload),
    #[serde(rename = "budget.alert")]
    BudgetAlert(EventPayload),
    #[serde(rename = "task.awaiting_approval")]
    TaskAwaitingApproval(EventPayload),
    #[serde(rename = "message.created")]
    MessageCreated(EventPayload),
}

impl InboundEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::TaskCompleted(_) => EventKind::TaskCompleted,
            Self::TaskFailed(_) => EventKind::TaskFailed,
            Self::BudgetAlert(_) => EventKind::BudgetAlert,
            Self::TaskAwaitingApproval(_) => EventKind::TaskAwaitingApproval,
            Self::MessageCreated(_) => EventKind::MessageCreated,
        }
    }

    #[must_use]
    pub fn payload(&self) -> &EventPayload {
        match self {
            Self::TaskCompleted(payload)
            | Self::TaskFailed(payload)
            | Self::BudgetAlert(payload)
            | Self::TaskAwaitingApproval(payload)
            | Self::MessageCreated(payload) => payload,
        }
    }

    #[must_use]
    pub fn task_id(&self) -> Option<&str> {
        self.payload().task_id.as_deref()
    }

    #[must_use]
    pub fn result(&self) -> EventResult {
        let Some(raw) = self.payload().result.as_ref() else {
            return EventResult::default();
        };
        let parsed = parse_task_result(raw);
        let text_field = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        EventResult {
            content: parsed.content,
            files: parsed.files,
            lane: text_field("lane"),
            model: text_field("model"),
            cost_usd: raw.get("cost_usd").and_then(Value::as_f64),
        }
    }
}

/// Authentication frame sent as the first message of every connection.
#[must_use]
pub fn auth_frame(token: &str) -> String {
    json!({"type": "auth", "token": token}).to_string()
}

/// Parse a raw text frame.
///
/// Returns `Ok(None)` for well-formed JSON that is not an `update` envelope.
pub fn parse_frame(text: &str) -> Result<Option<InboundEvent>> {
    let value: Value = serde_json::from_str(text)?;
    let object = value
        .as_object()
        .ok_or_else(|| ChannelError::Protocol("expected JSON object frame".to_string()))?;

    if object.get("event").and_then(Value::as_str) != Some("update") {
        return Ok(None);
    }
    let data = match object.get("data") {
        None | Some(Value::Null) => return Ok(None),
        Some(data) => data.clone(),
    };

    serde_json::from_value(data)
        .map(Some)
        .map_err(|error| ChannelError::Protocol(format!("invalid update payload: {}", error)))
}
