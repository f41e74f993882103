use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::broadcast::forward_typing;
use crate::chat::model::Message;
use crate::error::MessagingError;
use crate::state::AppState;
use crate::ws::broadcast::send_to_connection;
use crate::ws::ConnectionSender;

/// Control frames a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    Ping,
    MarkDelivered {
        message_id: String,
    },
    Typing {
        recipient_id: String,
        #[serde(default)]
        is_typing: bool,
    },
}

/// Event frames pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Pong,
    NewMessage {
        message: Message,
    },
    MessageRead {
        message_id: String,
        read_at: DateTime<Utc>,
    },
    MessagesRead {
        user_id: String,
        count: usize,
    },
    Typing {
        user_id: String,
        is_typing: bool,
    },
    Error {
        code: u16,
        message: String,
    },
}

/// Handle an incoming text (JSON) frame.
/// Decodes the frame, dispatches based on its type, sends any direct reply.
pub async fn handle_text_message(
    text: &str,
    tx: &ConnectionSender,
    state: &AppState,
    user_id: &str,
) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(
                user_id = %user_id,
                error = %e,
                "Failed to decode client frame"
            );
            send_error(tx, 400, "Invalid frame");
            return;
        }
    };

    dispatch_frame(frame, tx, state, user_id).await;
}

/// Dispatch a decoded frame to the appropriate handler.
async fn dispatch_frame(frame: ClientFrame, tx: &ConnectionSender, state: &AppState, user_id: &str) {
    match frame {
        ClientFrame::Ping => {
            send_to_connection(tx, &ServerEvent::Pong);
        }
        ClientFrame::MarkDelivered { message_id } => {
            match state.messages.mark_delivered(user_id, &message_id).await {
                Ok(applied) if !applied.durable => {
                    tracing::warn!(
                        user_id = %user_id,
                        message_id = %message_id,
                        "Delivered status queued, not yet durable"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(
                        user_id = %user_id,
                        message_id = %message_id,
                        error = %err,
                        "mark_delivered rejected"
                    );
                    send_messaging_error(tx, &err);
                }
            }
        }
        ClientFrame::Typing {
            recipient_id,
            is_typing,
        } => {
            if recipient_id.is_empty() {
                send_error(tx, 400, "recipientId required");
                return;
            }
            forward_typing(&state.connections, user_id, &recipient_id, is_typing);
        }
    }
}

fn send_messaging_error(tx: &ConnectionSender, err: &MessagingError) {
    send_error(tx, err.status_code().as_u16(), &err.to_string());
}

/// Send an error frame on this connection only.
fn send_error(tx: &ConnectionSender, code: u16, message: &str) {
    send_to_connection(
        tx,
        &ServerEvent::Error {
            code,
            message: message.to_string(),
        },
    );
}
