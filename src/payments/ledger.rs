use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Local record of webhook event ids, so a redelivered event is applied once.
pub struct WebhookLedger {
    conn: Connection,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS webhook_events (
        event_id      TEXT PRIMARY KEY,
        event_type    TEXT NOT NULL,
        status        TEXT NOT NULL,
        received_at   INTEGER NOT NULL,
        processed_at  INTEGER
    );
"#;

impl WebhookLedger {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Claims `event_id` for processing. False when it was already claimed.
    pub fn try_claim(&self, event_id: &str, event_type: &str, now: i64) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO webhook_events (event_id, event_type, status, received_at)
             VALUES (?1, ?2, 'processing', ?3)",
            params![event_id, event_type, now],
        )?;
        Ok(inserted == 1)
    }

    pub fn mark_processed(&self, event_id: &str, status: &str, now: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE webhook_events SET status = ?2, processed_at = ?3 WHERE event_id = ?1",
            params![event_id, status, now],
        )?;
        Ok(())
    }

    /// Forgets a claim whose processing failed so the provider's retry is applied.
    pub fn release(&self, event_id: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM webhook_events WHERE event_id = ?1",
            params![event_id],
        )?;
        Ok(())
    }

    pub fn status(&self, event_id: &str) -> Result<Option<String>> {
        let status = self
            .conn
            .query_row(
                "SELECT status FROM webhook_events WHERE event_id = ?1",
                params![event_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status)
    }
}
