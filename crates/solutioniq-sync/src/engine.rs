//! Reconciliation of optimistic local messages with dispatch responses,
//! push events and poll results.
//!
//! Every dispatched unit of work gets a user echo and an assistant
//! placeholder before the request leaves. Queued work is tracked in the task
//! placeholder map together with the source expected to resolve it; the map
//! is the single gate for terminal application, so a task is applied at most
//! once however many sources report it.

use crate::cache::{QueryCache, QueryKey};
use crate::local::{LocalMessage, LocalStatus};
use crate::merge::{DisplayMessage, merge};
use crate::poller::{FallbackPoller, PollOutcome, PollSink, PollerConfig};
use solutioniq_api::{
    AgentApi, Approval, ApprovalDecision, ChatRequest, Conversation, CreateTaskRequest,
    DispatchResponse, DispatchStatus, FileAttachment, GatewayError, TaskListResponse, TaskRecord,
    TaskStatus,
};
use solutioniq_stream::{EventKind, InboundEvent, StreamHandle};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";
pub const TIMEOUT_MESSAGE: &str = "Timed out waiting for a response.";

/// Unclaimed terminal events kept for dispatches whose response is still in
/// flight.
const EARLY_EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub poller: PollerConfig,
    pub notice_buffer: usize,
    pub invalidation_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poller: PollerConfig::default(),
            notice_buffer: 32,
            invalidation_buffer: 64,
        }
    }
}

/// Which path is expected to deliver a queued task's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    AwaitingEvent,
    AwaitingPoll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderEntry {
    pub placeholder_id: String,
    pub source: ResolutionSource,
}

/// Transient user-facing feedback about a failed dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    RateLimited,
    RequestFailed(String),
}

impl Notice {
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::RateLimited => "Rate limited. Wait a moment and try again.".to_string(),
            Self::RequestFailed(reason) => format!("Request failed: {}", reason),
        }
    }
}

/// Result of handing a dispatch to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Completed, degraded or failed in the response itself, or by a terminal
    /// event that arrived before the response.
    Settled(DispatchStatus),
    Queued {
        task_id: String,
        source: ResolutionSource,
    },
    /// The request itself failed; the placeholder was removed.
    Rejected { rate_limited: bool },
    /// The conversation changed while the request was in flight.
    Abandoned,
}

/// What applying an event or poll result did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// No placeholder is waiting on the task: already resolved, abandoned by a
    /// conversation switch, or never ours. Events are still held briefly in
    /// case their dispatch response is in flight.
    Stale,
    /// Not a terminal task event; caches were refreshed at most.
    NotTerminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Via {
    Event,
    Poll,
}

#[derive(Debug, Clone, PartialEq)]
enum Resolution {
    Completed(Reply),
    Failed(String),
    TimedOut,
}

/// Content destined for an assistant placeholder.
#[derive(Debug, Clone, Default, PartialEq)]
struct Reply {
    content: String,
    files: Vec<FileAttachment>,
    lane: Option<String>,
    model: Option<String>,
    cost_usd: Option<f64>,
    tokens_used: Option<u64>,
}

/// Dispatch response normalized across chat sends and task creation.
#[derive(Debug, Clone, PartialEq)]
struct Dispatched {
    status: DispatchStatus,
    task_id: Option<String>,
    conversation_id: Option<String>,
    reply: Reply,
    /// Server-supplied reason for a rejected dispatch.
    failure: Option<String>,
}

impl From<DispatchResponse> for Dispatched {
    fn from(response: DispatchResponse) -> Self {
        Self {
            status: response.status,
            task_id: response.task_id,
            conversation_id: response.conversation_id,
            reply: Reply {
                content: response.content,
                files: response.files,
                lane: response.lane,
                model: response.model,
                cost_usd: response.cost_usd,
                tokens_used: response.tokens_used,
            },
            failure: None,
        }
    }
}

impl From<TaskRecord> for Dispatched {
    fn from(record: TaskRecord) -> Self {
        let status = match record.status {
            TaskStatus::Completed => DispatchStatus::Completed,
            TaskStatus::Pending
            | TaskStatus::Queued
            | TaskStatus::Running
            | TaskStatus::AwaitingApproval => DispatchStatus::Queued,
            TaskStatus::Failed | TaskStatus::Unknown => DispatchStatus::Failed,
        };
        let failure = match resolution_from_record(&record) {
            Resolution::Failed(reason) if status == DispatchStatus::Failed => Some(reason),
            _ => None,
        };
        Self {
            status,
            reply: reply_from_record(&record),
            task_id: Some(record.id),
            conversation_id: record.conversation_id,
            failure,
        }
    }
}

fn reply_from_record(record: &TaskRecord) -> Reply {
    let parsed = record.parsed_result();
    Reply {
        content: parsed.content,
        files: parsed.files,
        lane: record.lane.clone(),
        model: record.model.clone(),
        cost_usd: record.cost_usd,
        tokens_used: record.tokens_used,
    }
}

fn resolution_from_event(event: &InboundEvent) -> Option<Resolution> {
    match event.kind() {
        EventKind::TaskCompleted => {
            let result = event.result();
            Some(Resolution::Completed(Reply {
                content: result.content,
                files: result.files,
                lane: result.lane,
                model: result.model,
                cost_usd: result.cost_usd,
                tokens_used: None,
            }))
        }
        EventKind::TaskFailed => {
            let payload = event.payload();
            let reason = payload
                .error
                .clone()
                .or_else(|| payload.message.clone())
                .unwrap_or_else(|| FAILURE_MESSAGE.to_string());
            Some(Resolution::Failed(reason))
        }
        _ => None,
    }
}

fn resolution_from_record(record: &TaskRecord) -> Resolution {
    if record.status == TaskStatus::Failed {
        Resolution::Failed(
            record
                .error
                .clone()
                .unwrap_or_else(|| FAILURE_MESSAGE.to_string()),
        )
    } else {
        Resolution::Completed(reply_from_record(record))
    }
}

fn fill_reply(message: &mut LocalMessage, reply: Reply) {
    message.content = reply.content;
    message.files = reply.files;
    message.lane = reply.lane;
    message.model = reply.model;
    message.cost_usd = reply.cost_usd;
    message.tokens_used = reply.tokens_used;
}

fn mark_error(message: &mut LocalMessage, text: String) {
    message.content = text;
    message.status = Some(LocalStatus::Error);
}

fn settle(message: &mut LocalMessage, resolution: Resolution) {
    match resolution {
        Resolution::Completed(reply) => {
            fill_reply(message, reply);
            message.status = None;
        }
        Resolution::Failed(reason) => mark_error(message, reason),
        Resolution::TimedOut => mark_error(message, TIMEOUT_MESSAGE.to_string()),
    }
}

fn conversation_keys(conversation_id: Option<&str>) -> Vec<QueryKey> {
    let mut keys = Vec::with_capacity(2);
    if let Some(id) = conversation_id {
        keys.push(QueryKey::ConversationMessages(id.to_string()));
    }
    keys.push(QueryKey::Conversations);
    keys
}

#[derive(Debug, Default)]
struct SyncState {
    active_conversation: Option<String>,
    locals: Vec<LocalMessage>,
    placeholders: HashMap<String, PlaceholderEntry>,
    /// Bumped on every hard reset so late responses can tell they are stale.
    epoch: u64,
    /// Terminal events that arrived before any placeholder awaited their task,
    /// oldest first.
    early: VecDeque<(String, Resolution)>,
}

impl SyncState {
    fn local_mut(&mut self, id: &str) -> Option<&mut LocalMessage> {
        self.locals.iter_mut().find(|message| message.id == id)
    }

    fn remember_early(&mut self, task_id: &str, resolution: Resolution) {
        if self.early.len() == EARLY_EVENT_CAPACITY {
            self.early.pop_front();
        }
        self.early.push_back((task_id.to_string(), resolution));
    }

    fn take_early(&mut self, task_id: &str) -> Option<Resolution> {
        let index = self.early.iter().position(|(id, _)| id == task_id)?;
        self.early.remove(index).map(|(_, resolution)| resolution)
    }
}

struct DispatchTicket {
    epoch: u64,
    user_id: String,
    placeholder_id: String,
}

struct EngineInner {
    api: Arc<dyn AgentApi>,
    stream: StreamHandle,
    poller: FallbackPoller,
    cache: QueryCache,
    state: Mutex<SyncState>,
    notices: broadcast::Sender<Notice>,
    this: Weak<EngineInner>,
}

/// Reconciliation engine for one chat view.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(api: Arc<dyn AgentApi>, stream: StreamHandle, config: SyncConfig) -> Self {
        let (notices, _) = broadcast::channel(config.notice_buffer.max(1));
        let inner = Arc::new_cyclic(|this| EngineInner {
            poller: FallbackPoller::new(Arc::clone(&api), config.poller),
            api,
            stream,
            cache: QueryCache::new(config.invalidation_buffer),
            state: Mutex::new(SyncState::default()),
            notices,
            this: this.clone(),
        });
        Self { inner }
    }

    /// Send a chat message through the dispatch pipeline.
    pub async fn send_message(&self, text: &str) -> DispatchOutcome {
        self.send_message_with_files(text, Vec::new()).await
    }

    pub async fn send_message_with_files(
        &self,
        text: &str,
        file_ids: Vec<String>,
    ) -> DispatchOutcome {
        let (ticket, conversation_id) = self.inner.begin_dispatch(text);
        let request = ChatRequest {
            message: text.to_string(),
            conversation_id,
            file_ids,
        };
        match self.inner.api.send_chat(&request).await {
            Ok(response) => self.inner.on_dispatched(&ticket, response.into()),
            Err(error) => self.inner.on_dispatch_error(&ticket, &error),
        }
    }

    /// Create a task through the same pipeline as a chat message.
    pub async fn submit_task(
        &self,
        title: &str,
        description: Option<String>,
        priority: Option<u8>,
    ) -> DispatchOutcome {
        let (ticket, conversation_id) = self.inner.begin_dispatch(title);
        let request = CreateTaskRequest {
            title: title.to_string(),
            description,
            priority,
            conversation_id,
        };
        match self.inner.api.create_task(&request).await {
            Ok(record) => self.inner.on_dispatched(&ticket, record.into()),
            Err(error) => self.inner.on_dispatch_error(&ticket, &error),
        }
    }

    /// Apply a push event. Terminal task events resolve their placeholder at
    /// most once; other kinds only refresh caches.
    pub fn apply_event(&self, event: &InboundEvent) -> ApplyOutcome {
        let Some(resolution) = resolution_from_event(event) else {
            self.inner.refresh_for(event);
            return ApplyOutcome::NotTerminal;
        };
        let Some(task_id) = event.task_id() else {
            debug!(kind = event.kind().as_str(), "terminal event without task id");
            return ApplyOutcome::Stale;
        };
        self.inner.resolve(task_id, resolution, Via::Event)
    }

    /// Subscribe to the channel and apply every event in arrival order.
    ///
    /// The pump exits once the engine is dropped and the next event arrives,
    /// or when the channel closes; abort the handle to stop it sooner.
    pub fn spawn_event_pump(&self) -> JoinHandle<()> {
        let mut events = self.inner.stream.subscribe();
        let engine = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(inner) = engine.upgrade() else {
                            break;
                        };
                        SyncEngine { inner }.apply_event(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event pump lagged; events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Switch to `conversation_id` (or to no conversation). Abandons all
    /// outstanding waits: pollers stop, registrations are withdrawn, local
    /// messages and the placeholder map are cleared.
    pub fn select_conversation(&self, conversation_id: Option<&str>) {
        let mut state = self.inner.lock_state();
        if state.active_conversation.as_deref() == conversation_id && state.locals.is_empty() {
            return;
        }
        self.inner
            .hard_reset(&mut state, conversation_id.map(str::to_string));
    }

    pub fn start_new_conversation(&self) {
        let mut state = self.inner.lock_state();
        self.inner.hard_reset(&mut state, None);
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<(), GatewayError> {
        self.inner.api.delete_conversation(conversation_id).await?;
        {
            let mut state = self.inner.lock_state();
            if state.active_conversation.as_deref() == Some(conversation_id) {
                self.inner.hard_reset(&mut state, None);
            }
        }
        self.inner.cache.remove_messages(conversation_id);
        self.inner.cache.invalidate(QueryKey::Conversations);
        info!(conversation_id, "conversation deleted");
        Ok(())
    }

    pub async fn refresh_conversations(&self) -> Result<Vec<Conversation>, GatewayError> {
        let conversations = self.inner.api.list_conversations().await?;
        self.inner.cache.store_conversations(conversations.clone());
        Ok(conversations)
    }

    pub async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
    ) -> Result<TaskListResponse, GatewayError> {
        let tasks = self.inner.api.list_tasks(status).await?;
        self.inner.cache.mark_fresh(&QueryKey::Tasks);
        Ok(tasks)
    }

    pub async fn pending_approvals(&self) -> Result<Vec<Approval>, GatewayError> {
        let approvals = self.inner.api.pending_approvals().await?;
        self.inner.cache.mark_fresh(&QueryKey::Approvals);
        Ok(approvals)
    }

    /// Approve or reject `approval_id`. Approval and task lists go stale once
    /// the platform accepts the decision.
    pub async fn decide_approval(
        &self,
        approval_id: &str,
        decision: ApprovalDecision,
        notes: Option<String>,
    ) -> Result<(), GatewayError> {
        self.inner
            .api
            .approval_action(approval_id, decision, notes)
            .await?;
        self.inner.cache.invalidate(QueryKey::Approvals);
        self.inner.cache.invalidate(QueryKey::Tasks);
        info!(approval_id, decision = decision.as_str(), "approval decided");
        Ok(())
    }

    /// Re-read confirmed history for the active conversation and return the
    /// merged view.
    pub async fn refresh_active_conversation(&self) -> Result<Vec<DisplayMessage>, GatewayError> {
        if let Some(conversation_id) = self.active_conversation() {
            let messages = self.inner.api.conversation_messages(&conversation_id).await?;
            self.inner.cache.store_messages(&conversation_id, messages);
        }
        Ok(self.displayed_messages())
    }

    /// Cached confirmed history of the active conversation merged with the
    /// current local messages.
    #[must_use]
    pub fn displayed_messages(&self) -> Vec<DisplayMessage> {
        let (conversation_id, locals) = {
            let state = self.inner.lock_state();
            (state.active_conversation.clone(), state.locals.clone())
        };
        let confirmed = conversation_id
            .as_deref()
            .and_then(|id| self.inner.cache.messages(id))
            .unwrap_or_default();
        merge(&confirmed, &locals)
    }

    #[must_use]
    pub fn active_conversation(&self) -> Option<String> {
        self.inner.lock_state().active_conversation.clone()
    }

    #[must_use]
    pub fn local_messages(&self) -> Vec<LocalMessage> {
        self.inner.lock_state().locals.clone()
    }

    #[must_use]
    pub fn placeholder_for(&self, task_id: &str) -> Option<PlaceholderEntry> {
        self.inner.lock_state().placeholders.get(task_id).cloned()
    }

    /// Task ids still waiting on an event or poll, sorted.
    #[must_use]
    pub fn awaiting_tasks(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.lock_state().placeholders.keys().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    #[must_use]
    pub fn poller(&self) -> &FallbackPoller {
        &self.inner.poller
    }

    #[must_use]
    pub fn stream(&self) -> &StreamHandle {
        &self.inner.stream
    }

    pub fn subscribe_invalidations(&self) -> broadcast::Receiver<QueryKey> {
        self.inner.cache.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }
}

impl EngineInner {
    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_dispatch(&self, text: &str) -> (DispatchTicket, Option<String>) {
        let echo = LocalMessage::user_echo(text);
        let placeholder = LocalMessage::assistant_placeholder();

        let mut state = self.lock_state();
        let ticket = DispatchTicket {
            epoch: state.epoch,
            user_id: echo.id.clone(),
            placeholder_id: placeholder.id.clone(),
        };
        state.locals.push(echo);
        state.locals.push(placeholder);
        (ticket, state.active_conversation.clone())
    }

    fn on_dispatched(&self, ticket: &DispatchTicket, dispatched: Dispatched) -> DispatchOutcome {
        let (outcome, keys) = {
            let mut state = self.lock_state();
            if state.epoch != ticket.epoch {
                debug!(task_id = ?dispatched.task_id, "response arrived after conversation switch");
                return DispatchOutcome::Abandoned;
            }

            if let Some(echo) = state.local_mut(&ticket.user_id) {
                echo.status = None;
                echo.task_id.clone_from(&dispatched.task_id);
            }
            if state.active_conversation.is_none() {
                state.active_conversation.clone_from(&dispatched.conversation_id);
            }
            let conversation_id = state.active_conversation.clone();

            match (dispatched.status, dispatched.task_id) {
                (DispatchStatus::Completed | DispatchStatus::Degraded, task_id) => {
                    let status = dispatched.status;
                    if let Some(placeholder) = state.local_mut(&ticket.placeholder_id) {
                        fill_reply(placeholder, dispatched.reply);
                        placeholder.task_id = task_id;
                        placeholder.status =
                            (status == DispatchStatus::Degraded).then_some(LocalStatus::Degraded);
                    }
                    (
                        DispatchOutcome::Settled(status),
                        conversation_keys(conversation_id.as_deref()),
                    )
                }
                (DispatchStatus::Queued, Some(task_id)) => {
                    if let Some(placeholder) = state.local_mut(&ticket.placeholder_id) {
                        placeholder.task_id = Some(task_id.clone());
                    }
                    if let Some(resolution) = state.take_early(&task_id) {
                        debug!(
                            task_id = task_id.as_str(),
                            "task resolved before its queued response"
                        );
                        let status = match resolution {
                            Resolution::Completed(_) => DispatchStatus::Completed,
                            Resolution::Failed(_) | Resolution::TimedOut => DispatchStatus::Failed,
                        };
                        if let Some(placeholder) = state.local_mut(&ticket.placeholder_id) {
                            settle(placeholder, resolution);
                        }
                        (
                            DispatchOutcome::Settled(status),
                            conversation_keys(conversation_id.as_deref()),
                        )
                    } else {
                        let source = self.await_task(
                            &mut state,
                            &task_id,
                            &ticket.placeholder_id,
                            conversation_id.as_deref(),
                        );
                        (DispatchOutcome::Queued { task_id, source }, Vec::new())
                    }
                }
                (status, task_id) => {
                    warn!(status = ?status, task_id = ?task_id, "dispatch not accepted");
                    let reason = dispatched
                        .failure
                        .unwrap_or_else(|| FAILURE_MESSAGE.to_string());
                    if let Some(placeholder) = state.local_mut(&ticket.placeholder_id) {
                        placeholder.task_id = task_id;
                        mark_error(placeholder, reason);
                    }
                    (DispatchOutcome::Settled(DispatchStatus::Failed), Vec::new())
                }
            }
        };

        for key in keys {
            self.cache.invalidate(key);
        }
        outcome
    }

    /// Record the wait and pick its resolution source from the channel's
    /// connectivity right now.
    fn await_task(
        &self,
        state: &mut SyncState,
        task_id: &str,
        placeholder_id: &str,
        conversation_id: Option<&str>,
    ) -> ResolutionSource {
        let source = if self.stream.is_connected() {
            self.stream.register_pending_task(task_id);
            ResolutionSource::AwaitingEvent
        } else {
            let sink: Weak<dyn PollSink> = self.this.clone();
            self.poller
                .poll_for_result(task_id, placeholder_id, conversation_id, sink);
            ResolutionSource::AwaitingPoll
        };
        state.placeholders.insert(
            task_id.to_string(),
            PlaceholderEntry {
                placeholder_id: placeholder_id.to_string(),
                source,
            },
        );
        debug!(task_id, placeholder_id, source = ?source, "task queued");
        source
    }

    fn on_dispatch_error(&self, ticket: &DispatchTicket, error: &GatewayError) -> DispatchOutcome {
        let rate_limited = error.is_rate_limited();
        {
            let mut state = self.lock_state();
            if state.epoch != ticket.epoch {
                return DispatchOutcome::Abandoned;
            }
            state
                .locals
                .retain(|message| message.id != ticket.placeholder_id);
            if let Some(echo) = state.local_mut(&ticket.user_id) {
                echo.status = Some(LocalStatus::Error);
            }
        }

        warn!(rate_limited, "dispatch failed: {}", error);
        let notice = if rate_limited {
            Notice::RateLimited
        } else {
            Notice::RequestFailed(error.to_string())
        };
        let _ = self.notices.send(notice);
        DispatchOutcome::Rejected { rate_limited }
    }

    fn resolve(&self, task_id: &str, resolution: Resolution, via: Via) -> ApplyOutcome {
        let keys = {
            let mut state = self.lock_state();
            let Some(entry) = state.placeholders.remove(task_id) else {
                debug!(task_id, via = ?via, "no placeholder waiting; ignoring");
                if via == Via::Event {
                    state.remember_early(task_id, resolution);
                }
                return ApplyOutcome::Stale;
            };

            if let Some(placeholder) = state.local_mut(&entry.placeholder_id) {
                settle(placeholder, resolution);
            }

            self.stream.remove_pending_task(task_id);
            if via == Via::Event && entry.source == ResolutionSource::AwaitingPoll {
                self.poller.cancel(&entry.placeholder_id);
            }
            debug!(task_id, via = ?via, source = ?entry.source, "task resolved");
            conversation_keys(state.active_conversation.as_deref())
        };

        for key in keys {
            self.cache.invalidate(key);
        }
        ApplyOutcome::Applied
    }

    fn refresh_for(&self, event: &InboundEvent) {
        let active = self.lock_state().active_conversation.clone();
        let keys = match event.kind() {
            EventKind::TaskAwaitingApproval => {
                let mut keys = vec![QueryKey::Approvals];
                if let Some(task_id) = event.task_id() {
                    keys.push(QueryKey::Task(task_id.to_string()));
                }
                keys
            }
            EventKind::MessageCreated => {
                let conversation = event
                    .payload()
                    .conversation_id
                    .clone()
                    .or(active);
                conversation_keys(conversation.as_deref())
            }
            _ => Vec::new(),
        };
        for key in keys {
            self.cache.invalidate(key);
        }
    }

    fn hard_reset(&self, state: &mut SyncState, next: Option<String>) {
        self.poller.cancel_all();
        for task_id in state.placeholders.keys() {
            self.stream.remove_pending_task(task_id);
        }
        let abandoned = state.placeholders.len();
        state.placeholders.clear();
        state.early.clear();
        state.locals.clear();
        state.active_conversation = next;
        state.epoch += 1;
        info!(
            conversation_id = ?state.active_conversation,
            abandoned,
            "conversation switched"
        );
    }
}

impl PollSink for EngineInner {
    fn poll_finished(&self, task_id: &str, placeholder_id: &str, outcome: PollOutcome) {
        let resolution = match outcome {
            PollOutcome::Resolved(record) => resolution_from_record(&record),
            PollOutcome::TimedOut => Resolution::TimedOut,
        };
        debug!(task_id, placeholder_id, "poll finished");
        self.resolve(task_id, resolution, Via::Poll);
    }
}
