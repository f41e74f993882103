use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking; no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "-- Migration 1: Direct messages

CREATE TABLE messages (
    id TEXT PRIMARY KEY,
    seq INTEGER NOT NULL UNIQUE,
    from_user_id TEXT NOT NULL,
    to_user_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    attachments TEXT NOT NULL DEFAULT '[]',
    metadata TEXT,
    created_at TEXT NOT NULL,
    status TEXT NOT NULL,
    read_at TEXT
);

CREATE INDEX idx_messages_pair ON messages(from_user_id, to_user_id);
CREATE INDEX idx_messages_recipient ON messages(to_user_id, status);
",
    )])
}
