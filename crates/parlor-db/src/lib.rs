pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::info;

pub use queries::groups::{CascadeReport, NewGroup};
pub use queries::messages::NewMessage;
pub use queries::users::NewImage;

pub struct Database {
    conn: Mutex<Connection>,
    /// Last timestamp handed out, in microseconds since the epoch.
    clock: AtomicI64,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let db = Self::init(conn)?;

        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        // Resume the clock past anything already persisted so restarts
        // never hand out a timestamp older than stored data.
        let last: i64 = conn.query_row(
            "SELECT MAX(
                 COALESCE((SELECT MAX(created_at) FROM messages), 0),
                 COALESCE((SELECT MAX(last_active_at) FROM last_visits), 0)
             )",
            [],
            |row| row.get(0),
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            clock: AtomicI64::new(last),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Writer access. Callers needing a transaction open it on the
    /// connection handed in here; the lock serialises all writers.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&mut conn)
    }

    /// Strictly increasing wall-clock timestamp in microseconds.
    ///
    /// Call with the writer lock held so the order of timestamps matches
    /// the order rows are inserted.
    pub fn now_micros(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let prev = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or_else(|last| last);
        now.max(prev + 1)
    }
}

pub fn micros_to_datetime(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}

/// True when SQLite rejected a write under a UNIQUE or PRIMARY KEY index,
/// e.g. two registrations racing for the same username.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _))
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
