//! Request gateway for the SolutionIQ agent platform.
//!
//! Every call is a JSON request against the configured base URL with an
//! optional bearer token. Non-2xx responses surface as [`GatewayError::Http`]
//! carrying the status and body text.

use std::time::Duration;

use async_trait::async_trait;
pub use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub mod types;

pub use types::{
    Approval, ApprovalActionRequest, ApprovalDecision, ApprovalListResponse, ApprovalStatus,
    ChatRequest, ConfirmedMessage, Conversation, ConversationListResponse,
    ConversationMessagesResponse, CreateTaskRequest, DispatchResponse, DispatchStatus,
    FileAttachment, MAX_UPLOAD_BYTES, MessageRole, ParsedResult, TaskListResponse, TaskRecord,
    TaskStatus, UploadRejection, parse_task_result, validate_upload,
};

pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_READ_ATTEMPTS: usize = 2;
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_ms: u64,
    /// Attempts for idempotent reads. Writes are always sent once.
    pub read_attempts: usize,
}

impl ApiClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            read_attempts: DEFAULT_READ_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = non_empty_string(token.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("api_base_url_missing")]
    BaseUrlMissing,
    #[error("api_invalid_path")]
    InvalidPath,
    #[error("api_request_failed:{message}")]
    Request { message: String },
    #[error("api_read_failed:{message}")]
    Read { message: String },
    #[error("api_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
    #[error("api_json_decode_failed:{message}")]
    Decode { message: String },
}

impl GatewayError {
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(StatusCode::TOO_MANY_REQUESTS)
    }
}

/// Operations the reconciliation layer needs from the platform.
#[async_trait]
pub trait AgentApi: Send + Sync {
    async fn send_chat(&self, request: &ChatRequest) -> Result<DispatchResponse, GatewayError>;

    async fn create_task(&self, request: &CreateTaskRequest) -> Result<TaskRecord, GatewayError>;

    async fn get_task(&self, task_id: &str) -> Result<TaskRecord, GatewayError>;

    async fn list_conversations(&self) -> Result<Vec<Conversation>, GatewayError>;

    async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ConfirmedMessage>, GatewayError>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), GatewayError>;

    async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
    ) -> Result<TaskListResponse, GatewayError>;

    async fn pending_approvals(&self) -> Result<Vec<Approval>, GatewayError>;

    /// Approve or reject a pending approval; the response body is discarded.
    async fn approval_action(
        &self,
        approval_id: &str,
        decision: ApprovalDecision,
        notes: Option<String>,
    ) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    read_attempts: usize,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig) -> Result<Self, GatewayError> {
        let base_url = normalize_base_url(config.base_url.as_str())?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|error| GatewayError::Request {
                message: error.to_string(),
            })?;
        Ok(Self {
            base_url,
            token: config.token.and_then(non_empty_string),
            timeout: Duration::from_millis(config.timeout_ms.max(1)),
            read_attempts: config.read_attempts.max(1),
            http,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    #[must_use]
    pub fn tasks_path() -> &'static str {
        "/tasks"
    }

    #[must_use]
    pub fn task_path(task_id: &str) -> String {
        format!("/tasks/{}", task_id.trim())
    }

    #[must_use]
    pub fn tasks_by_status_path(status: Option<TaskStatus>) -> String {
        match status {
            Some(status) => format!("/tasks?status={}", status.as_str()),
            None => Self::tasks_path().to_string(),
        }
    }

    #[must_use]
    pub fn chat_path() -> &'static str {
        "/chat"
    }

    #[must_use]
    pub fn conversations_path() -> &'static str {
        "/chat/conversations"
    }

    #[must_use]
    pub fn conversation_path(conversation_id: &str) -> String {
        format!("/chat/conversations/{}", conversation_id.trim())
    }

    #[must_use]
    pub fn conversation_messages_path(conversation_id: &str) -> String {
        format!("/chat/conversations/{}/messages", conversation_id.trim())
    }

    #[must_use]
    pub fn pending_approvals_path() -> &'static str {
        "/approvals/pending"
    }

    #[must_use]
    pub fn approval_action_path(approval_id: &str, decision: ApprovalDecision) -> String {
        format!("/approvals/{}/{}", approval_id.trim(), decision.as_str())
    }

    #[must_use]
    pub fn health_path() -> &'static str {
        "/health"
    }

    /// Reachability probe; any failure reads as unhealthy.
    pub async fn health_check(&self) -> bool {
        let Some(url) = self.endpoint(Self::health_path()) else {
            return false;
        };
        match self.http.get(url.as_str()).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                debug!("health check against {} failed: {}", self.base_url, error);
                false
            }
        }
    }

    pub async fn get_json<T>(&self, path: &str) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(path).ok_or(GatewayError::InvalidPath)?;
        let mut last_error: Option<String> = None;

        for attempt in 0..self.read_attempts {
            let request = self.authorized(self.http.get(url.as_str()));
            match request.send().await {
                Ok(response) => return decode_json_response(response).await,
                Err(error) => {
                    debug!("GET {} attempt {} failed: {}", path, attempt + 1, error);
                    last_error = Some(error.to_string());
                }
            }
        }

        Err(GatewayError::Request {
            message: last_error.unwrap_or_else(|| "unknown".to_string()),
        })
    }

    pub async fn post_json<Req, Res>(&self, path: &str, payload: &Req) -> Result<Res, GatewayError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let url = self.endpoint(path).ok_or(GatewayError::InvalidPath)?;
        let request = self.authorized(self.http.post(url.as_str())).json(payload);
        let response = request
            .send()
            .await
            .map_err(|error| GatewayError::Request {
                message: error.to_string(),
            })?;
        decode_json_response(response).await
    }

    pub async fn delete_json<Res>(&self, path: &str) -> Result<Res, GatewayError>
    where
        Res: DeserializeOwned,
    {
        let url = self.endpoint(path).ok_or(GatewayError::InvalidPath)?;
        let request = self.authorized(self.http.delete(url.as_str()));
        let response = request
            .send()
            .await
            .map_err(|error| GatewayError::Request {
                message: error.to_string(),
            })?;
        decode_json_response(response).await
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
            .timeout(self.timeout);
        match self.token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl AgentApi for ApiClient {
    async fn send_chat(&self, request: &ChatRequest) -> Result<DispatchResponse, GatewayError> {
        self.post_json(Self::chat_path(), request).await
    }

    async fn create_task(&self, request: &CreateTaskRequest) -> Result<TaskRecord, GatewayError> {
        self.post_json(Self::tasks_path(), request).await
    }

    async fn get_task(&self, task_id: &str) -> Result<TaskRecord, GatewayError> {
        self.get_json(Self::task_path(task_id).as_str()).await
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, GatewayError> {
        let response: ConversationListResponse =
            self.get_json(Self::conversations_path()).await?;
        Ok(response.into_conversations())
    }

    async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ConfirmedMessage>, GatewayError> {
        let response: ConversationMessagesResponse = self
            .get_json(Self::conversation_messages_path(conversation_id).as_str())
            .await?;
        Ok(response.into_messages())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), GatewayError> {
        self.delete_json::<Value>(Self::conversation_path(conversation_id).as_str())
            .await
            .map(|_| ())
    }

    async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
    ) -> Result<TaskListResponse, GatewayError> {
        self.get_json(Self::tasks_by_status_path(status).as_str())
            .await
    }

    async fn pending_approvals(&self) -> Result<Vec<Approval>, GatewayError> {
        let response: ApprovalListResponse =
            self.get_json(Self::pending_approvals_path()).await?;
        Ok(response.into_approvals())
    }

    async fn approval_action(
        &self,
        approval_id: &str,
        decision: ApprovalDecision,
        notes: Option<String>,
    ) -> Result<(), GatewayError> {
        self.post_json::<_, Value>(
            Self::approval_action_path(approval_id, decision).as_str(),
            &ApprovalActionRequest { notes },
        )
        .await
        .map(|_| ())
    }
}

pub fn format_http_error(status: StatusCode, body: &[u8]) -> GatewayError {
    let body = non_empty_string(String::from_utf8_lossy(body).to_string())
        .unwrap_or_else(|| "<empty>".to_string());
    GatewayError::Http { status, body }
}

fn normalize_base_url(base_url: &str) -> Result<String, GatewayError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::BaseUrlMissing);
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, GatewayError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let bytes = response.bytes().await.map_err(|error| GatewayError::Read {
        message: error.to_string(),
    })?;

    if !status.is_success() {
        return Err(format_http_error(status, &bytes));
    }

    // 204 and empty bodies decode as JSON null so `()`/`Option`/`Value` succeed.
    if status == StatusCode::NO_CONTENT || bytes.iter().all(u8::is_ascii_whitespace) {
        return serde_json::from_value::<T>(Value::Null).map_err(|error| GatewayError::Decode {
            message: error.to_string(),
        });
    }

    serde_json::from_slice::<T>(&bytes).map_err(|error| GatewayError::Decode {
        message: error.to_string(),
    })
}

fn non_empty_string(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
