//! Targeted fanout helpers for messaging events.
//! Wraps each event in a `ServerEvent` frame and pushes it to every live
//! connection of one user. Return values count the connections reached.

use chrono::{DateTime, Utc};

use crate::chat::model::Message;
use crate::ws::broadcast::send_to_user;
use crate::ws::protocol::ServerEvent;
use crate::ws::ConnectionRegistry;

/// Push a `new_message` event to the recipient.
pub fn notify_new_message(registry: &ConnectionRegistry, message: &Message) -> usize {
    send_to_user(
        registry,
        &message.to_user_id,
        &ServerEvent::NewMessage {
            message: message.clone(),
        },
    )
}

/// Tell the sender one of their messages was read.
pub fn notify_message_read(
    registry: &ConnectionRegistry,
    sender_id: &str,
    message_id: &str,
    read_at: DateTime<Utc>,
) -> usize {
    send_to_user(
        registry,
        sender_id,
        &ServerEvent::MessageRead {
            message_id: message_id.to_string(),
            read_at,
        },
    )
}

/// Tell `sender_id` that `reader_id` read `count` of their messages.
pub fn notify_messages_read(
    registry: &ConnectionRegistry,
    sender_id: &str,
    reader_id: &str,
    count: usize,
) -> usize {
    send_to_user(
        registry,
        sender_id,
        &ServerEvent::MessagesRead {
            user_id: reader_id.to_string(),
            count,
        },
    )
}

/// Forward a typing indicator. Transient: nothing is stored.
pub fn forward_typing(
    registry: &ConnectionRegistry,
    from_user_id: &str,
    recipient_id: &str,
    is_typing: bool,
) -> usize {
    send_to_user(
        registry,
        recipient_id,
        &ServerEvent::Typing {
            user_id: from_user_id.to_string(),
            is_typing,
        },
    )
}
