//! Reminder ledger: when did we last nag whom about what.
//!
//! One SQLite row per (subject, chat, issue type). The ledger answers the
//! dedup question ("is another reminder due given this type's cooldown?")
//! and is pruned on an independent schedule so storage stays bounded.
//!
//! Ledger failures are fail-closed: callers must treat an error as "do not
//! send" rather than risk double-notifying.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::domain::{DedupSubject, IssueType};
use crate::error::Result;

/// SQLite-backed notification history.
pub struct ReminderLedger {
    db: Mutex<Connection>,
}

impl ReminderLedger {
    /// Open or create the ledger at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Connection::open(path)?;
        Self::init_schema(&db)?;
        Ok(Self { db: Mutex::new(db) })
    }

    /// Open an in-memory ledger, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS reminders (
                subject_key TEXT NOT NULL,
                chat_id INTEGER NOT NULL,
                reminder_type TEXT NOT NULL,
                last_sent_at INTEGER NOT NULL,
                PRIMARY KEY (subject_key, chat_id, reminder_type)
            );

            CREATE INDEX IF NOT EXISTS idx_reminders_sent ON reminders(last_sent_at);
            "#,
        )?;
        Ok(())
    }

    /// Timestamp of the last reminder for this key, if any.
    pub fn last_sent(
        &self,
        subject: &DedupSubject,
        chat_id: i64,
        issue_type: IssueType,
    ) -> Result<Option<DateTime<Utc>>> {
        let db = self.db.lock().unwrap();
        let ts: Option<i64> = db
            .query_row(
                "SELECT last_sent_at FROM reminders
                 WHERE subject_key = ?1 AND chat_id = ?2 AND reminder_type = ?3",
                params![subject.storage_key(), chat_id, issue_type.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(ts.map(|secs| Utc.timestamp_opt(secs, 0).single().unwrap_or_default()))
    }

    /// True if a new reminder is due: no prior record, or at least the
    /// type's cooldown has elapsed since the last one (boundary inclusive).
    pub fn due_for(
        &self,
        subject: &DedupSubject,
        chat_id: i64,
        issue_type: IssueType,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        match self.last_sent(subject, chat_id, issue_type)? {
            None => Ok(true),
            Some(last) => {
                let elapsed_hours = (now - last).num_seconds() as f64 / 3600.0;
                Ok(elapsed_hours >= issue_type.cooldown_hours() as f64)
            }
        }
    }

    /// Record a sent reminder. Upserts by the composite key; the stored
    /// timestamp only ever moves forward.
    pub fn record(
        &self,
        subject: &DedupSubject,
        chat_id: i64,
        issue_type: IssueType,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            r#"
            INSERT INTO reminders (subject_key, chat_id, reminder_type, last_sent_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (subject_key, chat_id, reminder_type)
            DO UPDATE SET last_sent_at = MAX(last_sent_at, excluded.last_sent_at)
            "#,
            params![
                subject.storage_key(),
                chat_id,
                issue_type.as_str(),
                now.timestamp()
            ],
        )?;
        Ok(())
    }

    /// Delete records older than the retention horizon. Returns the number
    /// of rows removed.
    pub fn prune_older_than(&self, days: i64, now: DateTime<Utc>) -> Result<usize> {
        let horizon = (now - chrono::Duration::days(days)).timestamp();
        let db = self.db.lock().unwrap();
        let deleted = db.execute(
            "DELETE FROM reminders WHERE last_sent_at < ?1",
            params![horizon],
        )?;
        Ok(deleted)
    }

    /// Total number of ledger rows.
    pub fn len(&self) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let count: i64 = db.query_row("SELECT COUNT(*) FROM reminders", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl std::fmt::Debug for ReminderLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderLedger").finish()
    }
}
