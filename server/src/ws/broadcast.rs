use axum::extract::ws::Message;

use super::protocol::ServerEvent;
use super::{ConnectionRegistry, ConnectionSender};

/// Encode an event as a JSON text frame.
pub fn encode_event(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server event");
            None
        }
    }
}

/// Send an event to a specific user (all their connections).
/// Best effort: a connection that cannot take the frame is evicted.
/// Returns how many connections accepted it.
pub fn send_to_user(registry: &ConnectionRegistry, user_id: &str, event: &ServerEvent) -> usize {
    let Some(frame) = encode_event(event) else {
        return 0;
    };
    registry.for_each_connection(user_id, |conn| match conn.sender.try_send(frame.clone()) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(
                user_id = %user_id,
                connection = ?conn.id,
                error = %e,
                "Push to connection failed"
            );
            false
        }
    })
}

/// Reply on a single connection, e.g. `pong` or a protocol error.
pub fn send_to_connection(tx: &ConnectionSender, event: &ServerEvent) -> bool {
    match encode_event(event) {
        Some(frame) => tx.try_send(frame).is_ok(),
        None => false,
    }
}
