//! Message lifecycle: creation, delivery and read acknowledgements, and
//! unread accounting.

use chrono::Utc;
use std::sync::Arc;

use crate::chat::broadcast::{notify_message_read, notify_messages_read, notify_new_message};
use crate::chat::model::{Draft, Message, MessageStatus};
use crate::chat::presence::PresenceOracle;
use crate::chat::store::{ChatSummary, MessageStore};
use crate::error::{MessagingError, MessagingResult};
use crate::friends::FriendGraph;
use crate::ws::ConnectionRegistry;

/// Outcome of a mutation that has been applied in memory.
///
/// `durable` is false when the write could not be persisted after retries.
/// The change stands and stays queued for the periodic flush; callers
/// report it as accepted-but-pending instead of rejecting it.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied<T> {
    pub value: T,
    pub durable: bool,
}

pub struct MessageService {
    store: Arc<MessageStore>,
    friends: Arc<dyn FriendGraph>,
    connections: ConnectionRegistry,
}

impl MessageService {
    pub fn new(
        store: Arc<MessageStore>,
        friends: Arc<dyn FriendGraph>,
        connections: ConnectionRegistry,
    ) -> Self {
        Self {
            store,
            friends,
            connections,
        }
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    /// Flush everything queued. Failures are already logged by the store.
    async fn persist(&self) -> bool {
        self.store.flush_with_retry().await.is_ok()
    }

    /// Validate, authorize, append and persist a message, then push it to
    /// the recipient. When at least one of the recipient's connections
    /// takes the push the message comes back as `delivered`.
    ///
    /// Once appended the message is never withdrawn: a failed durable write
    /// yields `durable: false` and the push still happens.
    pub async fn create_message(
        &self,
        from_user_id: &str,
        to_user_id: &str,
        draft: impl Into<Draft>,
    ) -> MessagingResult<Applied<Message>> {
        let draft = draft.into();
        if from_user_id.trim().is_empty() || to_user_id.trim().is_empty() {
            return Err(MessagingError::InvalidMessage(
                "fromUserId and toUserId are required".to_string(),
            ));
        }
        draft.validate()?;
        if !self.friends.is_friend(from_user_id, to_user_id) {
            tracing::debug!(
                from = %from_user_id,
                to = %to_user_id,
                "Rejected message between non-friends"
            );
            return Err(MessagingError::NotFriends);
        }

        let id = uuid::Uuid::now_v7().to_string();
        let mut message = self
            .store
            .append(id, from_user_id, to_user_id, draft.into_parts())?;
        let mut durable = self.persist().await;

        tracing::info!(
            message_id = %message.id,
            from = %from_user_id,
            to = %to_user_id,
            kind = message.kind.as_str(),
            durable,
            "Message created"
        );

        if PresenceOracle::is_online(&self.connections, to_user_id)
            && notify_new_message(&self.connections, &message) > 0
        {
            if let Ok((updated, changed)) =
                self.store
                    .advance(&message.id, MessageStatus::Delivered, Utc::now())
            {
                message = updated;
                if changed {
                    durable = self.persist().await;
                }
            }
        }
        Ok(Applied {
            value: message,
            durable,
        })
    }

    /// Client acknowledgement that a message reached one of `user_id`'s
    /// devices. Only the recipient may acknowledge, and only `sent` moves
    /// forward; anything later is left alone.
    pub async fn mark_delivered(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> MessagingResult<Applied<Message>> {
        match self.store.get(message_id) {
            Some(message) if message.to_user_id == user_id => {}
            _ => return Err(MessagingError::NotFound),
        }
        let (message, _) =
            self.store
                .advance(message_id, MessageStatus::Delivered, Utc::now())?;
        Ok(Applied {
            value: message,
            durable: self.persist().await,
        })
    }

    /// Mark one message read and tell its sender. Re-marking keeps the
    /// original `readAt` but still notifies.
    pub async fn mark_message_read(&self, message_id: &str) -> MessagingResult<Applied<Message>> {
        let (message, _) = self
            .store
            .advance(message_id, MessageStatus::Read, Utc::now())?;
        let durable = self.persist().await;

        if let Some(read_at) = message.read_at {
            notify_message_read(&self.connections, &message.from_user_id, &message.id, read_at);
        }
        Ok(Applied {
            value: message,
            durable,
        })
    }

    /// Mark everything `friend_id` sent to `user_id` as read. Emits one
    /// aggregated event to `friend_id` when anything changed, whether or
    /// not the batch is durable yet.
    pub async fn mark_conversation_read(
        &self,
        user_id: &str,
        friend_id: &str,
    ) -> MessagingResult<Applied<usize>> {
        let count = self
            .store
            .mark_conversation_read(user_id, friend_id, Utc::now());
        let durable = self.persist().await;

        if count > 0 {
            tracing::debug!(user_id = %user_id, friend_id = %friend_id, count, "Conversation read");
            notify_messages_read(&self.connections, friend_id, user_id, count);
        }
        Ok(Applied {
            value: count,
            durable,
        })
    }

    pub fn get_conversation(&self, user_id: &str, friend_id: &str) -> Vec<Message> {
        self.store.conversation(user_id, friend_id)
    }

    pub fn get_user_messages(&self, user_id: &str) -> Vec<Message> {
        self.store.user_messages(user_id)
    }

    pub fn get_chats(&self, user_id: &str) -> Vec<ChatSummary> {
        self.store.chats(user_id)
    }

    pub fn get_unread_count(&self, user_id: &str, friend_id: &str) -> usize {
        self.store.unread_count(user_id, friend_id)
    }

    pub fn get_total_unread_count(&self, user_id: &str) -> usize {
        self.store.total_unread_count(user_id)
    }
}
