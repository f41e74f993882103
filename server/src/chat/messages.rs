//! REST endpoints for direct messages, read acknowledgements and unread counts.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::chat::model::{Attachment, Draft, Message, MessageKind};
use crate::chat::service::Applied;
use crate::chat::store::ChatSummary;
use crate::error::MessagingError;
use crate::state::AppState;

// --- Request / Response types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    pub from_user_id: String,
    pub to_user_id: String,
    #[serde(default, rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub message: String,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub unread_count: usize,
    pub chat_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalUnreadResponse {
    pub total_unread_count: usize,
}

/// Status for a mutation that was applied: `ok` when it is durable,
/// 202 Accepted while the write is still queued.
fn write_status<T>(applied: &Applied<T>, ok: StatusCode) -> StatusCode {
    if applied.durable {
        ok
    } else {
        StatusCode::ACCEPTED
    }
}

// --- Handlers ---

/// POST /api/messages
pub async fn create_message(
    State(state): State<AppState>,
    Json(body): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<Message>), MessagingError> {
    let draft = Draft::from_wire(body.kind, body.content, body.attachments, body.metadata)?;
    let applied = state
        .messages
        .create_message(&body.from_user_id, &body.to_user_id, draft)
        .await?;
    Ok((write_status(&applied, StatusCode::CREATED), Json(applied.value)))
}

/// PUT /api/messages/{message_id}/read
pub async fn mark_message_read(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<(StatusCode, Json<Message>), MessagingError> {
    let applied = state.messages.mark_message_read(&message_id).await?;
    Ok((write_status(&applied, StatusCode::OK), Json(applied.value)))
}

/// GET /api/users/{user_id}/messages, newest first.
pub async fn get_user_messages(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Vec<Message>> {
    Json(state.messages.get_user_messages(&user_id))
}

/// GET /api/users/{user_id}/chats
pub async fn get_chats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Vec<ChatSummary>> {
    Json(state.messages.get_chats(&user_id))
}

/// GET /api/users/{user_id}/unread-count
pub async fn get_total_unread_count(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<TotalUnreadResponse> {
    Json(TotalUnreadResponse {
        total_unread_count: state.messages.get_total_unread_count(&user_id),
    })
}

/// GET /api/conversations/{user_id}/{friend_id}, oldest first.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path((user_id, friend_id)): Path<(String, String)>,
) -> Json<Vec<Message>> {
    Json(state.messages.get_conversation(&user_id, &friend_id))
}

/// PUT /api/conversations/{user_id}/{friend_id}/read
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    Path((user_id, friend_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<MarkReadResponse>), MessagingError> {
    let applied = state
        .messages
        .mark_conversation_read(&user_id, &friend_id)
        .await?;
    let count = applied.value;
    Ok((
        write_status(&applied, StatusCode::OK),
        Json(MarkReadResponse {
            message: format!("{} messages marked as read", count),
            count,
        }),
    ))
}

/// GET /api/conversations/{user_id}/{friend_id}/unread-count
pub async fn get_unread_count(
    State(state): State<AppState>,
    Path((user_id, friend_id)): Path<(String, String)>,
) -> Json<UnreadCountResponse> {
    Json(UnreadCountResponse {
        unread_count: state.messages.get_unread_count(&user_id, &friend_id),
        chat_id: friend_id,
    })
}
