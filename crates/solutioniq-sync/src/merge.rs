//! Merged view of confirmed history and local entries.

use crate::local::{LocalMessage, LocalStatus};
use serde::Serialize;
use solutioniq_api::{ConfirmedMessage, FileAttachment, MessageRole};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DisplayMessage {
    Confirmed(ConfirmedView),
    Local(LocalMessage),
}

/// Serializable projection of a confirmed message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmedView {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub task_id: Option<String>,
    pub model: Option<String>,
    pub cost_usd: Option<f64>,
    pub files: Vec<FileAttachment>,
}

impl From<&ConfirmedMessage> for ConfirmedView {
    fn from(message: &ConfirmedMessage) -> Self {
        Self {
            id: message.id.clone(),
            role: message.role,
            content: message.content.clone(),
            task_id: message.task_id.clone(),
            model: message.model.clone(),
            cost_usd: message.cost_usd,
            files: message.files.clone(),
        }
    }
}

impl DisplayMessage {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Confirmed(message) => &message.id,
            Self::Local(message) => &message.id,
        }
    }

    #[must_use]
    pub fn role(&self) -> MessageRole {
        match self {
            Self::Confirmed(message) => message.role,
            Self::Local(message) => message.role,
        }
    }

    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::Confirmed(message) => &message.content,
            Self::Local(message) => &message.content,
        }
    }

    /// Always `None` for confirmed entries.
    #[must_use]
    pub fn status(&self) -> Option<LocalStatus> {
        match self {
            Self::Confirmed(_) => None,
            Self::Local(message) => message.status,
        }
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

/// Confirmed history in server order, then the local entries still worth
/// showing, in creation order.
///
/// A local entry stays while it is in flight, or while its task id has no
/// confirmed counterpart with the same role.
#[must_use]
pub fn merge(confirmed: &[ConfirmedMessage], local: &[LocalMessage]) -> Vec<DisplayMessage> {
    let mut displayed: Vec<DisplayMessage> = confirmed
        .iter()
        .map(|message| DisplayMessage::Confirmed(message.into()))
        .collect();

    displayed.extend(
        local
            .iter()
            .filter(|message| keep_local(confirmed, message))
            .cloned()
            .map(DisplayMessage::Local),
    );
    displayed
}

fn keep_local(confirmed: &[ConfirmedMessage], message: &LocalMessage) -> bool {
    if message.is_in_flight() {
        return true;
    }
    let Some(task_id) = message.task_id.as_deref() else {
        return false;
    };
    !confirmed
        .iter()
        .any(|entry| entry.role == message.role && entry.task_id.as_deref() == Some(task_id))
}
