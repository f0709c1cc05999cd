use solutioniq_api::{
    Approval, Conversation, DispatchStatus, FileAttachment, MessageRole, TaskRecord,
};
use solutioniq_sync::{DisplayMessage, ResolutionSource};

pub(crate) fn dispatch_status_label(status: DispatchStatus) -> &'static str {
    match status {
        DispatchStatus::Completed => "completed",
        DispatchStatus::Queued => "queued",
        DispatchStatus::Failed => "failed",
        DispatchStatus::Degraded => "degraded",
        DispatchStatus::Unknown => "unknown",
    }
}

pub(crate) fn source_label(source: ResolutionSource) -> &'static str {
    match source {
        ResolutionSource::AwaitingEvent => "push event",
        ResolutionSource::AwaitingPoll => "status polling",
    }
}

pub(crate) fn render_message(message: &DisplayMessage) -> String {
    let speaker = match message.role() {
        MessageRole::User => "you",
        MessageRole::Assistant => "agent",
    };
    let mut line = format!("{speaker:>5}: {}", message.content());
    if let Some(status) = message.status() {
        line.push_str(&format!(" [{}]", status.as_str()));
    }

    let (files, model) = match message {
        DisplayMessage::Confirmed(view) => (&view.files, view.model.as_deref()),
        DisplayMessage::Local(local) => (&local.files, local.model.as_deref()),
    };
    if let Some(model) = model {
        line.push_str(&format!(" ({model})"));
    }
    for file in files {
        line.push('\n');
        line.push_str(&render_attachment(file));
    }
    line
}

fn render_attachment(file: &FileAttachment) -> String {
    match file.url.as_deref() {
        Some(url) => format!("       attachment: {} <{}>", file.filename, url),
        None => format!("       attachment: {}", file.filename),
    }
}

pub(crate) fn render_conversation(conversation: &Conversation) -> String {
    let title = conversation.title.as_deref().unwrap_or("(untitled)");
    match conversation.message_count {
        Some(count) => format!("{}\t{}\t{} messages", conversation.id, title, count),
        None => format!("{}\t{}", conversation.id, title),
    }
}

pub(crate) fn render_task(task: &TaskRecord) -> String {
    let title = task.title.as_deref().unwrap_or("(untitled)");
    let mut line = format!("{}\t{}\t{}", task.id, task.status.as_str(), title);
    if let Some(error) = task.error.as_deref() {
        line.push_str(&format!("\t{error}"));
    }
    line
}

pub(crate) fn render_approval(approval: &Approval) -> String {
    let mut line = format!("{}\t{}", approval.id, approval.action);
    if !approval.description.is_empty() {
        line.push_str(&format!("\t{}", approval.description));
    }
    if let Some(task_id) = approval.task_id.as_deref() {
        line.push_str(&format!("\ttask {task_id}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use solutioniq_api::{
        Approval, ApprovalStatus, Conversation, FileAttachment, MessageRole, TaskRecord, TaskStatus,
    };
    use solutioniq_sync::{ConfirmedView, DisplayMessage, LocalMessage, LocalStatus};

    use super::{render_approval, render_conversation, render_message, render_task};

    #[test]
    fn local_messages_show_their_status() {
        let mut local = LocalMessage::assistant_placeholder();
        local.status = Some(LocalStatus::Typing);
        let line = render_message(&DisplayMessage::Local(local));
        assert!(line.starts_with("agent: "));
        assert!(line.ends_with("[typing]"));
    }

    #[test]
    fn confirmed_messages_list_attachments() {
        let view = ConfirmedView {
            id: "m1".to_string(),
            role: MessageRole::Assistant,
            content: "report ready".to_string(),
            task_id: Some("t1".to_string()),
            model: Some("sonnet".to_string()),
            cost_usd: None,
            files: vec![FileAttachment {
                id: "f1".to_string(),
                filename: "report.pdf".to_string(),
                content_type: None,
                size_bytes: None,
                url: Some("https://files.example.com/f1".to_string()),
            }],
        };
        let rendered = render_message(&DisplayMessage::Confirmed(view));
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "agent: report ready (sonnet)");
        assert_eq!(
            lines[1].trim(),
            "attachment: report.pdf <https://files.example.com/f1>"
        );
    }

    #[test]
    fn conversations_render_one_line_each() {
        let conversation = Conversation {
            id: "c1".to_string(),
            title: None,
            message_count: Some(4),
            created_at: None,
            updated_at: None,
        };
        assert_eq!(render_conversation(&conversation), "c1\t(untitled)\t4 messages");
    }

    #[test]
    fn tasks_show_status_and_failure_reason() {
        let task = TaskRecord {
            id: "t3".to_string(),
            title: Some("Draft reply".to_string()),
            status: TaskStatus::Failed,
            result: None,
            error: Some("quota exceeded".to_string()),
            conversation_id: None,
            lane: None,
            model: None,
            cost_usd: None,
            tokens_used: None,
            created_at: None,
        };
        assert_eq!(render_task(&task), "t3\tfailed\tDraft reply\tquota exceeded");
    }

    #[test]
    fn approvals_name_their_task() {
        let approval = Approval {
            id: "a1".to_string(),
            action: "send_email".to_string(),
            description: String::new(),
            task_id: Some("t4".to_string()),
            requested_at: None,
            status: ApprovalStatus::Pending,
        };
        assert_eq!(render_approval(&approval), "a1\tsend_email\ttask t4");
    }
}
