//! HTTP 接口（Twirp JSON 风格）
//!
//! `POST /twirp/acai.chat.ChatService/<Method>`，请求与响应为 camelCase JSON；
//! 错误返回 `{"code": ..., "msg": ...}` 与对应状态码。
//! 每个请求的取消信号派生自服务的关闭 token。

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::{ChatError, ConversationCoordinator};
use crate::memory::{Conversation, Message};

pub const SERVICE_PREFIX: &str = "/twirp/acai.chat.ChatService";

/// 路由共享状态
pub struct AppState {
    pub coordinator: ConversationCoordinator,
    /// 根取消信号（通常为 ShutdownManager 的 token）
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(coordinator: ConversationCoordinator, shutdown: CancellationToken) -> Self {
        Self {
            coordinator,
            shutdown,
        }
    }

    fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

/// Twirp 错误：HTTP 状态 + 错误码 + 消息
#[derive(Debug)]
pub struct TwirpError {
    status: StatusCode,
    code: &'static str,
    msg: String,
}

#[derive(Serialize)]
struct TwirpErrorBody<'a> {
    code: &'a str,
    msg: &'a str,
}

impl From<ChatError> for TwirpError {
    fn from(err: ChatError) -> Self {
        let (status, code) = match &err {
            ChatError::Validation { .. } => (StatusCode::BAD_REQUEST, "invalid_argument"),
            ChatError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ChatError::Cancelled => (StatusCode::REQUEST_TIMEOUT, "canceled"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        Self {
            status,
            code,
            msg: err.to_string(),
        }
    }
}

impl IntoResponse for TwirpError {
    fn into_response(self) -> Response {
        let body = TwirpErrorBody {
            code: self.code,
            msg: &self.msg,
        };
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StartConversationRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConversationResponse {
    pub conversation_id: String,
    pub title: String,
    pub reply: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContinueConversationRequest {
    pub conversation_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueConversationResponse {
    pub reply: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListConversationsRequest {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListConversationsResponse {
    pub conversations: Vec<ConversationView>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DescribeConversationRequest {
    pub conversation_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeConversationResponse {
    pub conversation: ConversationView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: String,
    pub title: String,
    pub messages: Vec<MessageView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub role: &'static str,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Message> for MessageView {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            role: m.role.as_str(),
            content: m.content,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

impl From<Conversation> for ConversationView {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            title: c.title,
            messages: c.messages.into_iter().map(MessageView::from).collect(),
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// 构建路由
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route(
            &format!("{SERVICE_PREFIX}/StartConversation"),
            post(start_conversation),
        )
        .route(
            &format!("{SERVICE_PREFIX}/ContinueConversation"),
            post(continue_conversation),
        )
        .route(
            &format!("{SERVICE_PREFIX}/ListConversations"),
            post(list_conversations),
        )
        .route(
            &format!("{SERVICE_PREFIX}/DescribeConversation"),
            post(describe_conversation),
        )
        .with_state(state)
}

async fn index() -> &'static str {
    "Hi, my name is Clippy!"
}

async fn start_conversation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartConversationRequest>,
) -> Result<Json<StartConversationResponse>, TwirpError> {
    let started = state
        .coordinator
        .start_conversation(&req.message, &state.request_token())
        .await?;
    Ok(Json(StartConversationResponse {
        conversation_id: started.conversation_id,
        title: started.title,
        reply: started.reply,
    }))
}

async fn continue_conversation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ContinueConversationRequest>,
) -> Result<Json<ContinueConversationResponse>, TwirpError> {
    let reply = state
        .coordinator
        .continue_conversation(&req.conversation_id, &req.message, &state.request_token())
        .await?;
    Ok(Json(ContinueConversationResponse { reply }))
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Json(_req): Json<ListConversationsRequest>,
) -> Result<Json<ListConversationsResponse>, TwirpError> {
    let conversations = state.coordinator.list_conversations().await?;
    Ok(Json(ListConversationsResponse {
        conversations: conversations.into_iter().map(ConversationView::from).collect(),
    }))
}

async fn describe_conversation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DescribeConversationRequest>,
) -> Result<Json<DescribeConversationResponse>, TwirpError> {
    let conversation = state
        .coordinator
        .describe_conversation(&req.conversation_id)
        .await?;
    Ok(Json(DescribeConversationResponse {
        conversation: conversation.into(),
    }))
}
