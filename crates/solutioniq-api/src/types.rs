//! Wire types for the agent platform HTTP contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Largest upload the platform accepts.
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

const ALLOWED_UPLOAD_TYPES: &[&str] = &[
    "image/",
    "application/pdf",
    "application/vnd.openxmlformats-officedocument",
    "application/vnd.ms-",
    "application/msword",
    "text/",
    "application/json",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    #[serde(alias = "agent")]
    Assistant,
}

impl MessageRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Server-reported outcome of a chat or task dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Completed,
    Queued,
    Failed,
    Degraded,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadRejection {
    #[error("File type \"{0}\" is not supported.")]
    UnsupportedType(String),
    #[error("File exceeds 100MB limit.")]
    TooLarge,
}

/// Check an upload against the attachment contract before it is sent.
pub fn validate_upload(content_type: &str, size_bytes: u64) -> Result<(), UploadRejection> {
    let allowed = ALLOWED_UPLOAD_TYPES
        .iter()
        .any(|prefix| content_type.starts_with(prefix) || content_type.contains(prefix));
    if !allowed {
        let shown = if content_type.trim().is_empty() {
            "unknown"
        } else {
            content_type
        };
        return Err(UploadRejection::UnsupportedType(shown.to_string()));
    }
    if size_bytes > MAX_UPLOAD_BYTES {
        return Err(UploadRejection::TooLarge);
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Ids of previously uploaded files.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DispatchResponse {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub status: DispatchStatus,
    #[serde(default)]
    pub lane: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub tokens_used: Option<u64>,
    #[serde(default)]
    pub message_number: Option<u64>,
    #[serde(default)]
    pub files: Vec<FileAttachment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Running,
    AwaitingApproval,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "awaiting_approval" => Ok(Self::AwaitingApproval),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub lane: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub tokens_used: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    #[must_use]
    pub fn parsed_result(&self) -> ParsedResult {
        self.result
            .as_ref()
            .map(parse_task_result)
            .unwrap_or_default()
    }
}

/// Task listing, served either as a bare array or wrapped with a total.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TaskListResponse {
    Bare(Vec<TaskRecord>),
    Wrapped {
        #[serde(default)]
        tasks: Vec<TaskRecord>,
        #[serde(default)]
        total: Option<u64>,
    },
}

impl TaskListResponse {
    #[must_use]
    pub fn total(&self) -> usize {
        match self {
            Self::Bare(tasks) => tasks.len(),
            Self::Wrapped { tasks, total } => total.map_or(tasks.len(), |total| total as usize),
        }
    }

    #[must_use]
    pub fn into_tasks(self) -> Vec<TaskRecord> {
        match self {
            Self::Bare(tasks) | Self::Wrapped { tasks, .. } => tasks,
        }
    }
}

/// Task result content with any attachments it carried.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResult {
    pub content: String,
    pub files: Vec<FileAttachment>,
}

/// Interpret a task `result` payload.
///
/// Results arrive either as plain text, as an object with `content` and
/// `files`, or as a string holding such an object serialized. Only the
/// structured shapes yield attachments.
#[must_use]
pub fn parse_task_result(value: &Value) -> ParsedResult {
    match value {
        Value::Null => ParsedResult::default(),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(inner @ Value::Object(_)) => structured_result(&inner).unwrap_or_else(|| {
                ParsedResult {
                    content: text.clone(),
                    files: Vec::new(),
                }
            }),
            _ => ParsedResult {
                content: text.clone(),
                files: Vec::new(),
            },
        },
        Value::Object(_) => structured_result(value).unwrap_or_else(|| ParsedResult {
            content: value.to_string(),
            files: Vec::new(),
        }),
        other => ParsedResult {
            content: other.to_string(),
            files: Vec::new(),
        },
    }
}

fn structured_result(value: &Value) -> Option<ParsedResult> {
    let object = value.as_object()?;
    let content = object
        .get("content")
        .or_else(|| object.get("text"))
        .and_then(Value::as_str);
    let files = object
        .get("files")
        .cloned()
        .and_then(|files| serde_json::from_value::<Vec<FileAttachment>>(files).ok());
    if content.is_none() && files.is_none() {
        return None;
    }
    Some(ParsedResult {
        content: content.unwrap_or_default().to_string(),
        files: files.unwrap_or_default(),
    })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message_count: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConversationListResponse {
    Bare(Vec<Conversation>),
    Wrapped {
        #[serde(default)]
        conversations: Vec<Conversation>,
    },
}

impl ConversationListResponse {
    #[must_use]
    pub fn into_conversations(self) -> Vec<Conversation> {
        match self {
            Self::Bare(conversations) | Self::Wrapped { conversations } => conversations,
        }
    }
}

/// Server-of-record chat entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfirmedMessage {
    pub id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub lane: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub files: Vec<FileAttachment>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConversationMessagesResponse {
    Bare(Vec<ConfirmedMessage>),
    Wrapped {
        #[serde(default)]
        messages: Vec<ConfirmedMessage>,
    },
}

impl ConversationMessagesResponse {
    #[must_use]
    pub fn into_messages(self) -> Vec<ConfirmedMessage> {
        match self {
            Self::Bare(messages) | Self::Wrapped { messages } => messages,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Approval {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub requested_at: Option<DateTime<Utc>>,
    pub status: ApprovalStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ApprovalListResponse {
    Bare(Vec<Approval>),
    Wrapped {
        #[serde(default)]
        approvals: Vec<Approval>,
    },
}

impl ApprovalListResponse {
    #[must_use]
    pub fn into_approvals(self) -> Vec<Approval> {
        match self {
            Self::Bare(approvals) | Self::Wrapped { approvals } => approvals,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

impl ApprovalDecision {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApprovalActionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dispatch_response_decodes_full_contract() -> Result<(), serde_json::Error> {
        let response: DispatchResponse = serde_json::from_value(json!({
            "content": "hi there",
            "task_id": "t1",
            "conversation_id": "c1",
            "status": "degraded",
            "lane": "fast",
            "model": "small-1",
            "cost_usd": 0.0021,
            "tokens_used": 412,
            "message_number": 3,
            "files": [{"id": "f1", "filename": "report.pdf"}]
        }))?;
        assert_eq!(response.status, DispatchStatus::Degraded);
        assert_eq!(response.task_id.as_deref(), Some("t1"));
        assert_eq!(response.files.len(), 1);
        assert_eq!(response.files[0].content_type, None);
        Ok(())
    }

    #[test]
    fn unknown_dispatch_status_decodes_as_unknown() -> Result<(), serde_json::Error> {
        let response: DispatchResponse =
            serde_json::from_value(json!({"status": "exploded", "content": ""}))?;
        assert_eq!(response.status, DispatchStatus::Unknown);
        Ok(())
    }

    #[test]
    fn agent_role_is_an_alias_for_assistant() -> Result<(), serde_json::Error> {
        let message: ConfirmedMessage =
            serde_json::from_value(json!({"id": "m1", "role": "agent", "content": "ok"}))?;
        assert_eq!(message.role, MessageRole::Assistant);
        Ok(())
    }

    #[test]
    fn list_responses_accept_bare_and_wrapped_shapes() -> Result<(), serde_json::Error> {
        let bare: ConversationListResponse = serde_json::from_str(r#"[{"id":"c1"}]"#)?;
        assert_eq!(bare.into_conversations()[0].id, "c1");

        let wrapped: ConversationListResponse =
            serde_json::from_str(r#"{"conversations":[{"id":"c1"},{"id":"c2"}]}"#)?;
        assert_eq!(wrapped.into_conversations().len(), 2);

        let messages: ConversationMessagesResponse =
            serde_json::from_str(r#"[{"id":"m1","role":"user","content":"hi"}]"#)?;
        assert_eq!(messages.into_messages()[0].role, MessageRole::User);

        let tasks: TaskListResponse =
            serde_json::from_str(r#"{"tasks":[{"id":"t1","status":"running"}],"total":7}"#)?;
        assert_eq!(tasks.total(), 7);
        assert_eq!(tasks.into_tasks()[0].status, TaskStatus::Running);

        let approvals: ApprovalListResponse = serde_json::from_str(
            r#"[{"id":"a1","action":"send_email","status":"pending"}]"#,
        )?;
        assert_eq!(approvals.into_approvals()[0].status, ApprovalStatus::Pending);
        Ok(())
    }

    #[test]
    fn plain_text_result_has_no_attachments() {
        let parsed = parse_task_result(&json!("done"));
        assert_eq!(parsed.content, "done");
        assert!(parsed.files.is_empty());
    }

    #[test]
    fn structured_result_string_yields_attachments() {
        let raw = json!({
            "content": "chart attached",
            "files": [{"id": "f9", "filename": "chart.png", "content_type": "image/png"}]
        })
        .to_string();
        let parsed = parse_task_result(&Value::String(raw));
        assert_eq!(parsed.content, "chart attached");
        assert_eq!(parsed.files.len(), 1);
        assert_eq!(parsed.files[0].filename, "chart.png");
    }

    #[test]
    fn object_result_without_known_fields_falls_back_to_json_text() {
        let parsed = parse_task_result(&json!({"answer": 42}));
        assert_eq!(parsed.content, r#"{"answer":42}"#);
        assert!(parsed.files.is_empty());
    }

    #[test]
    fn json_looking_text_that_is_not_an_object_stays_text() {
        let parsed = parse_task_result(&json!("[1,2,3]"));
        assert_eq!(parsed.content, "[1,2,3]");
    }

    #[test]
    fn terminal_statuses_are_completed_and_failed_only() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::AwaitingApproval.is_terminal());
        assert!(!TaskStatus::Unknown.is_terminal());
    }

    #[test]
    fn task_status_parses_wire_names() {
        assert_eq!("running".parse::<TaskStatus>(), Ok(TaskStatus::Running));
        assert_eq!(
            " Awaiting_Approval ".parse::<TaskStatus>(),
            Ok(TaskStatus::AwaitingApproval)
        );
        assert!("unknown".parse::<TaskStatus>().is_err());
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn upload_validation_enforces_type_and_size() {
        assert_eq!(validate_upload("image/png", 1024), Ok(()));
        assert_eq!(validate_upload("application/json", 10), Ok(()));
        assert_eq!(
            validate_upload("application/zip", 10),
            Err(UploadRejection::UnsupportedType("application/zip".to_string()))
        );
        assert_eq!(
            validate_upload("", 10),
            Err(UploadRejection::UnsupportedType("unknown".to_string()))
        );
        assert_eq!(
            validate_upload("text/plain", MAX_UPLOAD_BYTES + 1),
            Err(UploadRejection::TooLarge)
        );
    }
}
