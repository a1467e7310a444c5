//! SQLite persistence layer for monitored ports and their quota state.
//!
//! Uses `rusqlite` with bundled SQLite. The `ports` table is the only contract
//! between the daemon and the front-end, which run as separate processes:
//! - every operation is a single statement, so each is atomic on its own
//! - WAL mode plus a busy timeout lets both processes write concurrently

mod ports;

pub use ports::{ScannedPort, UndecodableRow};

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use crate::config;

/// Manages the SQLite connection for the quota store.
pub struct Database {
    conn: Mutex<Connection>,
}

/// One monitored port and its quota/usage state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitoredPort {
    pub port: u16,
    /// Unix timestamp (seconds) of the last registration.
    pub added_at: i64,
    pub time_limit_min: Option<u64>,
    pub data_limit_mb: Option<u64>,
    /// Cumulative inbound bytes last reported by the firewall.
    pub total_rx: u64,
    /// Cumulative outbound bytes last reported by the firewall.
    pub total_tx: u64,
    pub is_blocked: bool,
}

impl MonitoredPort {
    pub fn total_bytes(&self) -> u64 {
        self.total_rx.saturating_add(self.total_tx)
    }
}

impl Database {
    /// Open (or create) the database file at the given path.
    ///
    /// The parent directory is created when missing. The schema is not
    /// touched; call [`Database::ensure_schema`] before using the table.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating database directory {}", dir.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        Self::configure(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_millis(config::DB_BUSY_TIMEOUT_MS))?;
        // WAL lets the dashboard read while the daemon writes counters.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create the `ports` table if it does not exist yet.
    pub fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS ports (
                port INTEGER PRIMARY KEY,
                added_at INTEGER NOT NULL,
                time_limit_min INTEGER,
                data_limit_mb INTEGER,
                total_rx INTEGER NOT NULL DEFAULT 0,
                total_tx INTEGER NOT NULL DEFAULT 0,
                is_blocked INTEGER NOT NULL DEFAULT 0
            );
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection mutex poisoned"))
    }
}

fn map_port_row(row: &rusqlite::Row) -> rusqlite::Result<MonitoredPort> {
    Ok(MonitoredPort {
        port: row.get(0)?,
        added_at: row.get(1)?,
        time_limit_min: row.get(2)?,
        data_limit_mb: row.get(3)?,
        total_rx: row.get(4)?,
        total_tx: row.get(5)?,
        is_blocked: row.get::<_, i32>(6)? != 0,
    })
}

/// Current Unix timestamp in seconds.
pub fn chrono_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn open_memory_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.ensure_schema().unwrap();
        db
    }

    impl Database {
        /// Run arbitrary SQL against the connection (legacy rows, triggers).
        pub(crate) fn execute_raw(&self, sql: &str) {
            self.lock().unwrap().execute_batch(sql).unwrap();
        }
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let db = open_memory_db();
        db.ensure_schema().unwrap();
        db.ensure_schema().unwrap();
        assert!(db.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = std::env::temp_dir().join(format!("portquota-test-{}", std::process::id()));
        let path = dir.join("nested").join("ports.db");
        let _ = std::fs::remove_dir_all(&dir);

        let db = Database::open(&path).unwrap();
        db.ensure_schema().unwrap();
        assert!(path.exists());

        drop(db);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_total_bytes_sums_both_directions() {
        let port = MonitoredPort {
            port: 80,
            added_at: 0,
            time_limit_min: None,
            data_limit_mb: None,
            total_rx: 1_000,
            total_tx: 24,
            is_blocked: false,
        };
        assert_eq!(port.total_bytes(), 1_024);
    }
}
