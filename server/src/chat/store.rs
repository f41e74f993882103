//! In-memory message collection backed by a durable repository.
//!
//! Every mutation happens under one mutex, so readers never see a
//! half-updated record and status transitions on a message are linearized.
//! Mutated records are marked dirty and written out by `flush`, which
//! serializes durable writes so a stale snapshot can never overwrite a
//! newer one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::chat::model::{Message, MessageStatus, PayloadParts};
use crate::db::MessageRepository;
use crate::error::{MessagingError, MessagingResult, StoreError};

/// How hard a mutating call tries to make its write durable before it
/// reports a degraded write.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// One row of the chat list: the latest message exchanged with a partner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub partner_id: String,
    pub last_message: Message,
    pub unread_count: usize,
    pub last_message_time: DateTime<Utc>,
}

#[derive(Default)]
struct StoreInner {
    /// Insertion order; the index doubles as the persisted `seq`.
    messages: Vec<Message>,
    index: HashMap<String, usize>,
    dirty: HashSet<usize>,
    last_created_at: Option<DateTime<Utc>>,
}

impl StoreInner {
    /// Wall-clock time, clamped to stay strictly after the previous append.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_created_at {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(ts);
        ts
    }

    fn position(&self, id: &str) -> MessagingResult<usize> {
        self.index.get(id).copied().ok_or(MessagingError::NotFound)
    }
}

pub struct MessageStore {
    inner: Mutex<StoreInner>,
    repo: Arc<dyn MessageRepository>,
    flush_lock: tokio::sync::Mutex<()>,
    retry: RetryPolicy,
}

impl MessageStore {
    /// Load every persisted record from `repo`.
    pub fn open(repo: Arc<dyn MessageRepository>, retry: RetryPolicy) -> Result<Self, StoreError> {
        let messages = repo.load_all()?;
        let mut inner = StoreInner::default();
        for (pos, msg) in messages.into_iter().enumerate() {
            inner.index.insert(msg.id.clone(), pos);
            inner.last_created_at = inner.last_created_at.max(Some(msg.created_at));
            inner.messages.push(msg);
        }
        tracing::info!(messages = inner.messages.len(), "Message store loaded");

        Ok(Self {
            inner: Mutex::new(inner),
            repo,
            flush_lock: tokio::sync::Mutex::new(()),
            retry,
        })
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_writes(&self) -> usize {
        self.lock().dirty.len()
    }

    /// Append a new record with status `sent` and a server-assigned
    /// `created_at`. An id that already exists is rejected.
    pub fn append(
        &self,
        id: String,
        from_user_id: &str,
        to_user_id: &str,
        parts: PayloadParts,
    ) -> MessagingResult<Message> {
        let mut inner = self.lock();
        if inner.index.contains_key(&id) {
            return Err(MessagingError::InvalidMessage(format!(
                "duplicate message id {id}"
            )));
        }

        let message = Message {
            id: id.clone(),
            from_user_id: from_user_id.to_string(),
            to_user_id: to_user_id.to_string(),
            content: parts.content,
            kind: parts.kind,
            attachments: parts.attachments,
            metadata: parts.metadata,
            created_at: inner.next_timestamp(),
            status: MessageStatus::Sent,
            read: false,
            read_at: None,
        };

        let pos = inner.messages.len();
        inner.messages.push(message.clone());
        inner.index.insert(id, pos);
        inner.dirty.insert(pos);
        Ok(message)
    }

    pub fn get(&self, id: &str) -> Option<Message> {
        let inner = self.lock();
        inner.index.get(id).map(|&pos| inner.messages[pos].clone())
    }

    /// Move one message forward in its lifecycle. Returns the record as it
    /// stands afterwards and whether anything changed; backward moves are
    /// silent no-ops.
    pub fn advance(
        &self,
        id: &str,
        next: MessageStatus,
        at: DateTime<Utc>,
    ) -> MessagingResult<(Message, bool)> {
        let mut inner = self.lock();
        let pos = inner.position(id)?;
        let changed = inner.messages[pos].advance_to(next, at);
        if changed {
            inner.dirty.insert(pos);
        }
        Ok((inner.messages[pos].clone(), changed))
    }

    /// Mark every unread message from `friend_id` to `user_id` as read with
    /// a shared timestamp. Returns how many changed.
    pub fn mark_conversation_read(&self, user_id: &str, friend_id: &str, at: DateTime<Utc>) -> usize {
        let mut inner = self.lock();
        let StoreInner {
            messages, dirty, ..
        } = &mut *inner;

        let mut count = 0;
        for (pos, msg) in messages.iter_mut().enumerate() {
            if msg.from_user_id == friend_id
                && msg.is_unread_for(user_id)
                && msg.advance_to(MessageStatus::Read, at)
            {
                dirty.insert(pos);
                count += 1;
            }
        }
        count
    }

    /// All messages between the pair, oldest first. Ties keep insertion order.
    pub fn conversation(&self, user_id: &str, friend_id: &str) -> Vec<Message> {
        let mut out: Vec<Message> = self
            .lock()
            .messages
            .iter()
            .filter(|m| m.is_between(user_id, friend_id))
            .cloned()
            .collect();
        out.sort_by_key(|m| m.created_at);
        out
    }

    /// All messages sent or received by the user, newest first.
    pub fn user_messages(&self, user_id: &str) -> Vec<Message> {
        let mut out: Vec<Message> = self
            .lock()
            .messages
            .iter()
            .rev()
            .filter(|m| m.involves(user_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    pub fn unread_count(&self, user_id: &str, friend_id: &str) -> usize {
        self.lock()
            .messages
            .iter()
            .filter(|m| m.from_user_id == friend_id && m.is_unread_for(user_id))
            .count()
    }

    pub fn total_unread_count(&self, user_id: &str) -> usize {
        self.lock()
            .messages
            .iter()
            .filter(|m| m.is_unread_for(user_id))
            .count()
    }

    /// One summary per conversation partner, most recent conversation first.
    pub fn chats(&self, user_id: &str) -> Vec<ChatSummary> {
        let inner = self.lock();
        let mut by_partner: HashMap<&str, ChatSummary> = HashMap::new();

        for msg in inner.messages.iter().filter(|m| m.involves(user_id)) {
            let partner = if msg.from_user_id == user_id {
                msg.to_user_id.as_str()
            } else {
                msg.from_user_id.as_str()
            };
            let unread = usize::from(msg.is_unread_for(user_id));

            match by_partner.get_mut(partner) {
                Some(summary) => {
                    summary.unread_count += unread;
                    if msg.created_at >= summary.last_message_time {
                        summary.last_message_time = msg.created_at;
                        summary.last_message = msg.clone();
                    }
                }
                None => {
                    by_partner.insert(
                        partner,
                        ChatSummary {
                            partner_id: partner.to_string(),
                            last_message: msg.clone(),
                            unread_count: unread,
                            last_message_time: msg.created_at,
                        },
                    );
                }
            }
        }

        let mut chats: Vec<ChatSummary> = by_partner.into_values().collect();
        chats.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
        chats
    }

    /// Write every dirty record to the repository in one batch. On failure
    /// the records stay dirty. Returns the number of records written.
    pub async fn flush(&self) -> Result<usize, StoreError> {
        let _serialized = self.flush_lock.lock().await;

        let batch: Vec<(u64, Message)> = {
            let mut inner = self.lock();
            let mut positions: Vec<usize> = inner.dirty.drain().collect();
            positions.sort_unstable();
            positions
                .into_iter()
                .map(|pos| (pos as u64, inner.messages[pos].clone()))
                .collect()
        };
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        let positions: Vec<usize> = batch.iter().map(|(seq, _)| *seq as usize).collect();
        let repo = self.repo.clone();
        let result = tokio::task::spawn_blocking(move || repo.upsert(&batch))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))
            .and_then(|r| r);

        match result {
            Ok(()) => {
                tracing::debug!(records = count, "Flushed messages");
                Ok(count)
            }
            Err(e) => {
                self.lock().dirty.extend(positions);
                Err(e)
            }
        }
    }

    /// `flush` with bounded retries. On final failure the records remain
    /// queued for the next flush and the last error is returned.
    pub async fn flush_with_retry(&self) -> Result<(), StoreError> {
        let mut attempt = 0;
        loop {
            match self.flush().await {
                Ok(_) => return Ok(()),
                Err(e) if attempt + 1 < self.retry.attempts => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "Durable write failed, retrying");
                    tokio::time::sleep(self.retry.backoff * 2u32.pow(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        pending = self.pending_writes(),
                        "Durable write failed, mutation kept for next flush"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Flush, then ask the repository to checkpoint. Used on shutdown.
    pub async fn sync_all(&self) -> Result<(), StoreError> {
        self.flush().await?;
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || repo.checkpoint())
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Spawn the periodic durability task: flush every `every` regardless of
/// traffic, so writes that failed earlier are retried.
pub fn spawn_periodic_flush(store: Arc<MessageStore>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            match store.flush().await {
                Ok(0) => {}
                Ok(count) => tracing::info!("Periodic flush wrote {} messages", count),
                Err(e) => tracing::error!(error = %e, "Periodic flush failed"),
            }
        }
    })
}
