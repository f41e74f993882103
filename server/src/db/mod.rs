pub mod migrations;
pub mod models;

use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::chat::model::Message;
use crate::error::StoreError;
use models::{MessageRow, SELECT_MESSAGES, UPSERT_MESSAGE};

/// Type alias for the shared database connection.
/// rusqlite is synchronous; we wrap in Arc<Mutex> for thread safety
/// with tokio::task::spawn_blocking for DB operations.
pub type DbPool = Arc<Mutex<Connection>>;

/// Initialize the SQLite database: create data directory if needed,
/// open (or create) the database file, enable WAL mode, and run migrations.
pub fn init_db(data_dir: &str) -> Result<DbPool, StoreError> {
    std::fs::create_dir_all(data_dir)?;

    let db_path = Path::new(data_dir).join("hubchat.db");
    let mut conn = Connection::open(&db_path)?;

    // WAL keeps readers off the writer's back during flushes
    conn.pragma_update(None, "journal_mode", "WAL")?;

    migrations::migrations().to_latest(&mut conn)?;

    tracing::info!("Database initialized at {}", db_path.display());

    Ok(Arc::new(Mutex::new(conn)))
}

/// Durable backing for the message collection.
///
/// Implementations are blocking; callers run them on the blocking pool.
pub trait MessageRepository: Send + Sync + 'static {
    /// Every stored record, in insertion order.
    fn load_all(&self) -> Result<Vec<Message>, StoreError>;

    /// Insert or update the given records atomically. `seq` is the
    /// insertion index of each record; rows not named are left untouched.
    fn upsert(&self, records: &[(u64, Message)]) -> Result<(), StoreError>;

    /// Push buffered writes to their final location (e.g. WAL checkpoint).
    fn checkpoint(&self) -> Result<(), StoreError>;
}

/// SQLite-backed repository.
#[derive(Clone)]
pub struct SqliteRepository {
    db: DbPool,
}

impl SqliteRepository {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn open(data_dir: &str) -> Result<Self, StoreError> {
        Ok(Self::new(init_db(data_dir)?))
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A panic mid-transaction rolls back; the connection itself stays usable.
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MessageRepository for SqliteRepository {
    fn load_all(&self) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(SELECT_MESSAGES)?;
        let rows = stmt
            .query_map([], MessageRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(MessageRow::into_message).collect()
    }

    fn upsert(&self, records: &[(u64, Message)]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_MESSAGE)?;
            for (seq, msg) in records {
                let metadata = match &msg.metadata {
                    Some(value) => Some(serde_json::to_string(value)?),
                    None => None,
                };
                stmt.execute(params![
                    msg.id,
                    *seq as i64,
                    msg.from_user_id,
                    msg.to_user_id,
                    msg.kind.as_str(),
                    msg.content,
                    serde_json::to_string(&msg.attachments)?,
                    metadata,
                    msg.created_at.to_rfc3339(),
                    msg.status.as_str(),
                    msg.read_at.map(|t| t.to_rfc3339()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn checkpoint(&self) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }
}
