//! # DialClaw DB
//!
//! SQLite-backed persistence for campaigns, leads, cadence templates,
//! the progress ledger, and the activity log. One `CadenceDb` handle
//! wraps a WAL-mode connection behind a mutex and implements the store
//! traits from `dialclaw-core`, so the engine never sees SQL.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use dialclaw_core::error::{DialClawError, Result};

mod activity;
mod campaigns;
mod leads;
mod progress;
mod templates;

pub use leads::NewLead;

/// Shared database handle.
pub struct CadenceDb {
    pub(crate) conn: Mutex<Connection>,
}

impl CadenceDb {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DialClawError::Storage(format!("create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| DialClawError::Storage(format!("DB open: {e}")))?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DialClawError::Storage(format!("DB open: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // WAL for concurrent readers; FK enforcement for cascades
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .ok();
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Run schema migrations.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS campaigns (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'Pending',
                leads_count INTEGER NOT NULL DEFAULT 0,
                completed INTEGER NOT NULL DEFAULT 0,
                in_progress INTEGER NOT NULL DEFAULT 0,
                remaining INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                execution_status TEXT NOT NULL DEFAULT 'idle',
                cadence_template_id TEXT,
                cadence_start_date TEXT,
                cadence_stopped INTEGER NOT NULL DEFAULT 0,
                cadence_completed INTEGER NOT NULL DEFAULT 0,
                cadence_paused_at TEXT,
                cadence_resume_from_date TEXT,
                cadence_resume_day INTEGER,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS leads (
                id TEXT PRIMARY KEY,
                campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
                name TEXT NOT NULL DEFAULT '',
                phone_number TEXT NOT NULL DEFAULT '',
                phone_id TEXT,
                status TEXT NOT NULL DEFAULT 'Pending',
                disposition TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_leads_campaign_status
                ON leads (campaign_id, status);

            CREATE TABLE IF NOT EXISTS cadence_templates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                retry_dispositions TEXT NOT NULL DEFAULT '[]',  -- JSON array
                cadence_days TEXT NOT NULL DEFAULT '{}',        -- JSON day -> config
                created_at TEXT NOT NULL
            );

            -- Append-only progress ledger. The UNIQUE index is the
            -- idempotency key that makes duplicate slot execution a no-op.
            CREATE TABLE IF NOT EXISTS cadence_progress (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
                cadence_id TEXT NOT NULL,
                day INTEGER NOT NULL,
                attempt INTEGER NOT NULL,
                time_window TEXT NOT NULL,
                executed_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_progress_slot
                ON cadence_progress (campaign_id, cadence_id, day, time_window, attempt);

            CREATE TABLE IF NOT EXISTS activity_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lead_id TEXT NOT NULL,
                campaign_id TEXT NOT NULL,
                activity_type TEXT NOT NULL,
                to_disposition TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| DialClawError::Storage(format!("migration: {e}")))?;
        Ok(())
    }

    pub(crate) fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DialClawError::Storage(format!("connection lock poisoned: {e}")))
    }
}

/// Map a rusqlite error into the crate error type.
pub(crate) fn db_err(context: &str, e: impl std::fmt::Display) -> DialClawError {
    DialClawError::Storage(format!("{context}: {e}"))
}

/// Parse an RFC 3339 column, tolerating absence.
pub(crate) fn parse_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc))
}

/// Parse a required RFC 3339 column, falling back to now on corruption.
pub(crate) fn parse_ts_req(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
