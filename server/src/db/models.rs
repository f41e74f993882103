//! Row mapping for the `messages` table defined in migrations.rs.

use chrono::{DateTime, Utc};
use rusqlite::Row;

use crate::chat::model::{Message, MessageKind, MessageStatus};
use crate::error::StoreError;

pub const SELECT_MESSAGES: &str = "SELECT id, from_user_id, to_user_id, kind, content, attachments,
        metadata, created_at, status, read_at
 FROM messages
 ORDER BY seq ASC";

pub const UPSERT_MESSAGE: &str = "INSERT INTO messages
    (id, seq, from_user_id, to_user_id, kind, content, attachments, metadata, created_at, status, read_at)
 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
 ON CONFLICT(id) DO UPDATE SET status = excluded.status, read_at = excluded.read_at";

/// Raw column values for one message, decoded lazily so a malformed
/// record can be reported by id.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub kind: String,
    pub content: String,
    pub attachments: String,
    pub metadata: Option<String>,
    pub created_at: String,
    pub status: String,
    pub read_at: Option<String>,
}

impl MessageRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            from_user_id: row.get(1)?,
            to_user_id: row.get(2)?,
            kind: row.get(3)?,
            content: row.get(4)?,
            attachments: row.get(5)?,
            metadata: row.get(6)?,
            created_at: row.get(7)?,
            status: row.get(8)?,
            read_at: row.get(9)?,
        })
    }

    pub fn into_message(self) -> Result<Message, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: self.id.clone(),
            reason,
        };
        let kind = MessageKind::parse(&self.kind)
            .ok_or_else(|| corrupt(format!("unknown kind {}", self.kind)))?;
        let status = MessageStatus::parse(&self.status)
            .ok_or_else(|| corrupt(format!("unknown status {}", self.status)))?;
        let created_at = parse_time(&self.created_at).map_err(corrupt)?;
        let read_at = match &self.read_at {
            Some(ts) => Some(parse_time(ts).map_err(corrupt)?),
            None => None,
        };
        let attachments = serde_json::from_str(&self.attachments)?;
        let metadata = match &self.metadata {
            Some(raw) => Some(serde_json::from_str(raw)?),
            None => None,
        };

        Ok(Message {
            id: self.id,
            from_user_id: self.from_user_id,
            to_user_id: self.to_user_id,
            content: self.content,
            kind,
            attachments,
            metadata,
            created_at,
            status,
            read: status == MessageStatus::Read,
            read_at,
        })
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp {raw}: {e}"))
}
