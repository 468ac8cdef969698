//! Persistent storage for power samples and sessions.
//!
//! Uses SQLite with WAL mode so the daemon (writer) and one-shot CLI
//! commands (readers) can share the database file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use wattwise_protocol::{PowerSample, Session};

use crate::config::data_dir;

const CURRENT_SCHEMA_VERSION: i32 = 1;
const DATABASE_NAME: &str = "history.db";
const MAX_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MS_PER_HOUR: i64 = 3_600_000;

/// Errors that can occur during history storage operations
#[derive(Debug, thiserror::Error)]
pub enum HistoryStoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("History store lock poisoned")]
    Poisoned,
}

impl HistoryStoreError {
    /// True when a UNIQUE/CHECK/FK constraint rejected the write.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            HistoryStoreError::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation
        )
    }
}

pub type Result<T> = std::result::Result<T, HistoryStoreError>;

/// One connection shared by the scheduler, session manager and request handlers.
pub type SharedStore = Arc<Mutex<HistoryStore>>;

pub fn database_path() -> PathBuf {
    data_dir().join(DATABASE_NAME)
}

pub fn shared(store: HistoryStore) -> SharedStore {
    Arc::new(Mutex::new(store))
}

pub fn lock_store(store: &SharedStore) -> Result<MutexGuard<'_, HistoryStore>> {
    store.lock().map_err(|_| HistoryStoreError::Poisoned)
}

/// History storage backed by SQLite
pub struct HistoryStore {
    conn: Connection,
    path: PathBuf,
}

fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<PowerSample> {
    Ok(PowerSample {
        timestamp: row.get(0)?,
        session_id: row.get(1)?,
        power_watts: row.get(2)?,
        accumulated_kwh: row.get(3)?,
        cpu_util_pct: row.get(4)?,
        gpu_util_pct: row.get(5)?,
        mem_util_pct: row.get(6)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        start_time: row.get(1)?,
        end_time: row.get(2)?,
        total_kwh: row.get(3)?,
        total_cost: row.get(4)?,
    })
}

const SAMPLE_COLUMNS: &str =
    "timestamp, session_id, power_watts, accumulated_kwh, cpu_util, gpu_util, mem_util";
const SESSION_COLUMNS: &str = "id, start_time, end_time, total_kwh, total_cost";

impl HistoryStore {
    /// Open or create the history database in the data directory.
    ///
    /// Lock waits are capped at `busy_timeout` so a write never outlives a tick.
    pub fn open(busy_timeout: Duration) -> Result<Self> {
        std::fs::create_dir_all(data_dir())?;
        Self::open_at(&database_path(), busy_timeout)
    }

    pub fn open_at(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;
        conn.busy_timeout(busy_timeout.min(MAX_BUSY_TIMEOUT))?;

        let mut store = Self {
            conn,
            path: path.to_path_buf(),
        };
        store.initialize_schema()?;

        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let mut store = Self {
            conn,
            path: PathBuf::from(":memory:"),
        };
        store.initialize_schema()?;

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the database file size in bytes
    pub fn size_bytes(&self) -> Result<u64> {
        if self.path.to_string_lossy() == ":memory:" {
            return Ok(0);
        }
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Creates the schema on first open. Later versions add migrations here.
    fn initialize_schema(&mut self) -> Result<()> {
        if self.get_schema_version()? == 0 {
            self.create_initial_schema()?;
        }
        Ok(())
    }

    /// Get the current schema version (0 if not initialized)
    fn get_schema_version(&self) -> Result<i32> {
        let exists: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )?;

        if !exists {
            return Ok(0);
        }

        let version: i32 = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?
            .unwrap_or(0);

        Ok(version)
    }

    fn create_initial_schema(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute_batch(
            r#"
            CREATE TABLE schema_version (
                version INTEGER NOT NULL
            );

            CREATE TABLE sessions (
                id TEXT PRIMARY KEY,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                total_kwh REAL NOT NULL DEFAULT 0,
                total_cost REAL NOT NULL DEFAULT 0
            );

            CREATE TABLE power_samples (
                id INTEGER PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                power_watts REAL NOT NULL,
                accumulated_kwh REAL NOT NULL,
                cpu_util REAL NOT NULL DEFAULT 0,
                gpu_util REAL NOT NULL DEFAULT 0,
                mem_util REAL NOT NULL DEFAULT 0
            );

            -- At most one open session
            CREATE UNIQUE INDEX idx_sessions_single_open
                ON sessions((end_time IS NULL)) WHERE end_time IS NULL;
            CREATE INDEX idx_sessions_start ON sessions(start_time);
            CREATE INDEX idx_samples_timestamp ON power_samples(timestamp);
            CREATE INDEX idx_samples_session ON power_samples(session_id, timestamp);
            "#,
        )?;

        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?)",
            [CURRENT_SCHEMA_VERSION],
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn insert_sample(&self, sample: &PowerSample) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO power_samples
                (timestamp, session_id, power_watts, accumulated_kwh, cpu_util, gpu_util, mem_util)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                sample.timestamp,
                sample.session_id,
                sample.power_watts,
                sample.accumulated_kwh,
                sample.cpu_util_pct,
                sample.gpu_util_pct,
                sample.mem_util_pct,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get samples in a time range, oldest first
    pub fn get_samples(&self, from: i64, to: i64) -> Result<Vec<PowerSample>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS}
             FROM power_samples
             WHERE timestamp >= ? AND timestamp <= ?
             ORDER BY timestamp ASC, id ASC"
        ))?;

        let samples = stmt
            .query_map(params![from, to], sample_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(samples)
    }

    /// Samples from the last `hours` hours up to `now_ms`.
    pub fn get_recent_samples(&self, hours: u32, now_ms: i64) -> Result<Vec<PowerSample>> {
        let from = now_ms - i64::from(hours) * MS_PER_HOUR;
        self.get_samples(from, now_ms)
    }

    pub fn get_session_samples(&self, session_id: &str) -> Result<Vec<PowerSample>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS}
             FROM power_samples
             WHERE session_id = ?
             ORDER BY timestamp ASC, id ASC"
        ))?;

        let samples = stmt
            .query_map([session_id], sample_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(samples)
    }

    pub fn latest_sample(&self) -> Result<Option<PowerSample>> {
        let sample = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SAMPLE_COLUMNS} FROM power_samples
                     ORDER BY timestamp DESC, id DESC LIMIT 1"
                ),
                [],
                sample_from_row,
            )
            .optional()?;
        Ok(sample)
    }

    pub fn latest_session_sample(&self, session_id: &str) -> Result<Option<PowerSample>> {
        let sample = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SAMPLE_COLUMNS} FROM power_samples
                     WHERE session_id = ?
                     ORDER BY timestamp DESC, id DESC LIMIT 1"
                ),
                [session_id],
                sample_from_row,
            )
            .optional()?;
        Ok(sample)
    }

    /// Delete samples older than the given timestamp. Samples of the open
    /// session are kept so ending it still finds its last reading.
    pub fn delete_samples_before(&self, before: i64) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM power_samples
             WHERE timestamp < ?
               AND session_id NOT IN (SELECT id FROM sessions WHERE end_time IS NULL)",
            [before],
        )?;
        Ok(deleted)
    }

    pub fn insert_session(&self, session: &Session) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sessions (id, start_time, end_time, total_kwh, total_cost)
             VALUES (?, ?, ?, ?, ?)",
            params![
                session.id,
                session.start_time,
                session.end_time,
                session.total_kwh,
                session.total_cost,
            ],
        )?;
        Ok(())
    }

    /// Writes the closing fields of a session. Returns false if no open row matched.
    pub fn close_session(&self, session: &Session) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE sessions SET end_time = ?, total_kwh = ?, total_cost = ?
             WHERE id = ? AND end_time IS NULL",
            params![
                session.end_time,
                session.total_kwh,
                session.total_cost,
                session.id,
            ],
        )?;
        Ok(updated > 0)
    }

    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let session = self
            .conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"),
                [id],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    /// All sessions, newest start first
    pub fn get_sessions(&self) -> Result<Vec<Session>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY start_time DESC, rowid DESC"
        ))?;

        let sessions = stmt
            .query_map([], session_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(sessions)
    }

    pub fn get_open_session(&self) -> Result<Option<Session>> {
        let session = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE end_time IS NULL
                     ORDER BY start_time DESC, rowid DESC LIMIT 1"
                ),
                [],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    pub fn vacuum(&self) -> Result<()> {
        self.conn.execute("VACUUM", [])?;
        Ok(())
    }

    /// Rejects every write while set.
    #[cfg(test)]
    pub(crate) fn set_query_only(&self, query_only: bool) -> Result<()> {
        self.conn.pragma_update(None, "query_only", query_only)?;
        Ok(())
    }

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let sample_count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM power_samples", [], |row| row.get(0))?;

        let session_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;

        let oldest_sample: Option<i64> = self
            .conn
            .query_row("SELECT MIN(timestamp) FROM power_samples", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();

        let newest_sample: Option<i64> = self
            .conn
            .query_row("SELECT MAX(timestamp) FROM power_samples", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();

        let size_bytes = self.size_bytes()?;

        Ok(DatabaseStats {
            sample_count,
            session_count,
            oldest_sample,
            newest_sample,
            size_bytes,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub sample_count: i64,
    pub session_count: i64,
    pub oldest_sample: Option<i64>,
    pub newest_sample: Option<i64>,
    pub size_bytes: u64,
}
