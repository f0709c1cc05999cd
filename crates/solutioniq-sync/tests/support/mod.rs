#![allow(dead_code)]

use async_trait::async_trait;
use solutioniq_api::{
    AgentApi, Approval, ApprovalDecision, ApprovalStatus, ChatRequest, ConfirmedMessage,
    Conversation, CreateTaskRequest, DispatchResponse, DispatchStatus, GatewayError, MessageRole,
    StatusCode, TaskListResponse, TaskRecord, TaskStatus,
};
use solutioniq_stream::testing::{FrameSender, ScriptedConnector};
use solutioniq_stream::{ChannelConfig, ConnectionState, Frame, StreamChannel};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

/// In-memory platform with scripted responses.
#[derive(Default)]
pub struct MockApi {
    chat_responses: Mutex<VecDeque<Result<DispatchResponse, GatewayError>>>,
    task_responses: Mutex<VecDeque<Result<TaskRecord, GatewayError>>>,
    task_reads: Mutex<VecDeque<Result<TaskRecord, GatewayError>>>,
    chat_gate: Mutex<Option<oneshot::Receiver<()>>>,
    history: Mutex<HashMap<String, Vec<ConfirmedMessage>>>,
    conversations: Mutex<Vec<Conversation>>,
    approvals: Mutex<Vec<Approval>>,
    tasks: Mutex<Vec<TaskRecord>>,
    pub approval_actions: Mutex<Vec<(String, ApprovalDecision, Option<String>)>>,
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    pub task_requests: Mutex<Vec<CreateTaskRequest>>,
    pub deleted: Mutex<Vec<String>>,
    pub get_task_calls: AtomicUsize,
}

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_chat(&self, response: Result<DispatchResponse, GatewayError>) {
        locked(&self.chat_responses).push_back(response);
    }

    pub fn push_task(&self, response: Result<TaskRecord, GatewayError>) {
        locked(&self.task_responses).push_back(response);
    }

    /// Queue a `GET /tasks/{id}` result. Once the queue is empty reads report
    /// the task as still running.
    pub fn push_task_read(&self, response: Result<TaskRecord, GatewayError>) {
        locked(&self.task_reads).push_back(response);
    }

    /// Hold the next chat response until the returned sender fires.
    pub fn gate_chat(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *locked(&self.chat_gate) = Some(rx);
        tx
    }

    pub fn set_history(&self, conversation_id: &str, messages: Vec<ConfirmedMessage>) {
        locked(&self.history).insert(conversation_id.to_string(), messages);
    }

    pub fn set_conversations(&self, conversations: Vec<Conversation>) {
        *locked(&self.conversations) = conversations;
    }

    pub fn set_approvals(&self, approvals: Vec<Approval>) {
        *locked(&self.approvals) = approvals;
    }

    pub fn set_tasks(&self, tasks: Vec<TaskRecord>) {
        *locked(&self.tasks) = tasks;
    }

    pub fn get_task_calls(&self) -> usize {
        self.get_task_calls.load(Ordering::SeqCst)
    }

    pub fn last_chat_request(&self) -> Option<ChatRequest> {
        locked(&self.chat_requests).last().cloned()
    }
}

#[async_trait]
impl AgentApi for MockApi {
    async fn send_chat(&self, request: &ChatRequest) -> Result<DispatchResponse, GatewayError> {
        locked(&self.chat_requests).push(request.clone());
        let gate = locked(&self.chat_gate).take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        locked(&self.chat_responses)
            .pop_front()
            .unwrap_or_else(|| Ok(dispatch(DispatchStatus::Completed, Some("t0"), "ok")))
    }

    async fn create_task(&self, request: &CreateTaskRequest) -> Result<TaskRecord, GatewayError> {
        locked(&self.task_requests).push(request.clone());
        locked(&self.task_responses)
            .pop_front()
            .unwrap_or_else(|| Ok(task("t0", TaskStatus::Queued, None)))
    }

    async fn get_task(&self, task_id: &str) -> Result<TaskRecord, GatewayError> {
        self.get_task_calls.fetch_add(1, Ordering::SeqCst);
        locked(&self.task_reads)
            .pop_front()
            .unwrap_or_else(|| Ok(task(task_id, TaskStatus::Running, None)))
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, GatewayError> {
        Ok(locked(&self.conversations).clone())
    }

    async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ConfirmedMessage>, GatewayError> {
        Ok(locked(&self.history)
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), GatewayError> {
        locked(&self.deleted).push(conversation_id.to_string());
        Ok(())
    }

    async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
    ) -> Result<TaskListResponse, GatewayError> {
        let tasks = locked(&self.tasks)
            .iter()
            .filter(|task| status.is_none_or(|status| task.status == status))
            .cloned()
            .collect();
        Ok(TaskListResponse::Bare(tasks))
    }

    async fn pending_approvals(&self) -> Result<Vec<Approval>, GatewayError> {
        Ok(locked(&self.approvals).clone())
    }

    async fn approval_action(
        &self,
        approval_id: &str,
        decision: ApprovalDecision,
        notes: Option<String>,
    ) -> Result<(), GatewayError> {
        locked(&self.approval_actions).push((approval_id.to_string(), decision, notes));
        let mut approvals = locked(&self.approvals);
        let before = approvals.len();
        approvals.retain(|approval| approval.id != approval_id);
        if approvals.len() == before {
            return Err(http_error(StatusCode::NOT_FOUND, "approval not found"));
        }
        Ok(())
    }
}

pub fn dispatch(status: DispatchStatus, task_id: Option<&str>, content: &str) -> DispatchResponse {
    DispatchResponse {
        content: content.to_string(),
        task_id: task_id.map(str::to_string),
        conversation_id: Some("c1".to_string()),
        status,
        lane: Some("standard".to_string()),
        model: Some("m-1".to_string()),
        cost_usd: Some(0.01),
        tokens_used: Some(42),
        message_number: Some(1),
        files: Vec::new(),
    }
}

pub fn task(id: &str, status: TaskStatus, result: Option<serde_json::Value>) -> TaskRecord {
    TaskRecord {
        id: id.to_string(),
        title: Some("title".to_string()),
        status,
        result,
        error: None,
        conversation_id: Some("c1".to_string()),
        lane: None,
        model: None,
        cost_usd: None,
        tokens_used: None,
        created_at: None,
    }
}

pub fn approval(id: &str, task_id: Option<&str>) -> Approval {
    Approval {
        id: id.to_string(),
        action: "send_email".to_string(),
        description: "Send the weekly summary".to_string(),
        task_id: task_id.map(str::to_string),
        requested_at: None,
        status: ApprovalStatus::Pending,
    }
}

pub fn http_error(status: StatusCode, body: &str) -> GatewayError {
    GatewayError::Http {
        status,
        body: body.to_string(),
    }
}

pub fn confirmed(id: &str, role: MessageRole, task_id: Option<&str>, content: &str) -> ConfirmedMessage {
    ConfirmedMessage {
        id: id.to_string(),
        conversation_id: Some("c1".to_string()),
        role,
        content: content.to_string(),
        task_id: task_id.map(str::to_string),
        lane: None,
        model: None,
        cost_usd: None,
        files: Vec::new(),
        created_at: None,
    }
}

/// A channel that never connects.
pub fn offline_channel() -> anyhow::Result<StreamChannel> {
    Ok(StreamChannel::with_connector(
        ChannelConfig::new("ws://localhost:8000/ws/stream", "test-token"),
        Arc::new(ScriptedConnector::new()),
    )?)
}

/// A channel connected to a scripted socket. Keep the sender alive to keep
/// the socket open.
pub async fn online_channel() -> anyhow::Result<(StreamChannel, FrameSender)> {
    let connector = ScriptedConnector::new();
    let frames = connector.accept_next();
    let channel = StreamChannel::with_connector(
        ChannelConfig::new("ws://localhost:8000/ws/stream", "test-token"),
        Arc::new(connector),
    )?;
    channel.connect();
    channel
        .handle()
        .watch_state()
        .wait_for(|state| *state == ConnectionState::Connected)
        .await?;
    Ok((channel, frames))
}

pub fn push(frames: &FrameSender, json: serde_json::Value) -> anyhow::Result<()> {
    frames.send(Ok(Frame::Text(
        serde_json::json!({"event": "update", "data": json}).to_string(),
    )))?;
    Ok(())
}
