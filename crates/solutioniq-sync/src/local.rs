//! Chat entries that exist only on this client.

use chrono::{DateTime, Utc};
use serde::Serialize;
use solutioniq_api::{FileAttachment, MessageRole};
use uuid::Uuid;

/// Prefix of every locally generated message id. Server ids never carry it.
pub const LOCAL_ID_PREFIX: &str = "local_";

#[must_use]
pub fn new_local_id() -> String {
    format!("{}{}", LOCAL_ID_PREFIX, Uuid::now_v7().simple())
}

#[must_use]
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalStatus {
    Sending,
    Typing,
    Degraded,
    Error,
}

impl LocalStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Typing => "typing",
            Self::Degraded => "degraded",
            Self::Error => "error",
        }
    }
}

/// Optimistic chat entry awaiting confirmation by the server of record.
///
/// `status == None` means settled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub status: Option<LocalStatus>,
    pub task_id: Option<String>,
    pub lane: Option<String>,
    pub model: Option<String>,
    pub cost_usd: Option<f64>,
    pub tokens_used: Option<u64>,
    pub files: Vec<FileAttachment>,
    pub created_at: DateTime<Utc>,
}

impl LocalMessage {
    fn new(role: MessageRole, content: String, status: LocalStatus) -> Self {
        Self {
            id: new_local_id(),
            role,
            content,
            status: Some(status),
            task_id: None,
            lane: None,
            model: None,
            cost_usd: None,
            tokens_used: None,
            files: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Echo of what the user just sent.
    #[must_use]
    pub fn user_echo(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content.into(), LocalStatus::Sending)
    }

    /// Empty assistant entry standing in for the pending reply.
    #[must_use]
    pub fn assistant_placeholder() -> Self {
        Self::new(MessageRole::Assistant, String::new(), LocalStatus::Typing)
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.status.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ids_are_prefixed_and_unique() {
        let first = new_local_id();
        let second = new_local_id();
        assert!(is_local_id(&first));
        assert!(is_local_id(&second));
        assert_ne!(first, second);
        assert!(!is_local_id("msg_123"));
    }

    #[test]
    fn new_entries_start_in_flight() {
        let echo = LocalMessage::user_echo("hello");
        assert_eq!(echo.role, MessageRole::User);
        assert_eq!(echo.content, "hello");
        assert_eq!(echo.status, Some(LocalStatus::Sending));

        let placeholder = LocalMessage::assistant_placeholder();
        assert_eq!(placeholder.role, MessageRole::Assistant);
        assert!(placeholder.content.is_empty());
        assert_eq!(placeholder.status, Some(LocalStatus::Typing));
        assert!(placeholder.is_in_flight());
    }
}
