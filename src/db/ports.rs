//! `ports` table CRUD operations.

use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use super::{map_port_row, Database, MonitoredPort};

/// A `ports` row whose columns do not decode into a [`MonitoredPort`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndecodableRow {
    /// Raw `port` column, when that much is readable.
    pub port: Option<i64>,
    pub reason: String,
}

/// One row of a tolerant scan: decoded, or the reason it could not be.
pub type ScannedPort = std::result::Result<MonitoredPort, UndecodableRow>;

const SELECT_COLUMNS: &str =
    "SELECT port, added_at, time_limit_min, data_limit_mb, total_rx, total_tx, is_blocked FROM ports";

impl Database {
    /// Register a port, replacing any existing row and resetting its usage.
    pub fn upsert_port(
        &self,
        port: u16,
        added_at: i64,
        time_limit_min: Option<u64>,
        data_limit_mb: Option<u64>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO ports (port, added_at, time_limit_min, data_limit_mb, total_rx, total_tx, is_blocked)
             VALUES (?1, ?2, ?3, ?4, 0, 0, 0)",
            params![port, added_at, time_limit_min, data_limit_mb],
        )?;
        Ok(())
    }

    /// All ports still being polled.
    pub fn list_unblocked(&self) -> Result<Vec<MonitoredPort>> {
        self.query_ports(&format!("{SELECT_COLUMNS} WHERE is_blocked = 0"))
    }

    /// Like [`Database::list_unblocked`], but decodes row by row so a
    /// malformed record is reported in place instead of failing the whole scan.
    pub fn scan_unblocked(&self) -> Result<Vec<ScannedPort>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!("{SELECT_COLUMNS} WHERE is_blocked = 0"))?;
        let rows = stmt.query_map([], |row| {
            Ok(map_port_row(row).map_err(|e| UndecodableRow {
                port: row.get::<_, i64>(0).ok(),
                reason: e.to_string(),
            }))
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Every registered port, blocked or not.
    pub fn list_all(&self) -> Result<Vec<MonitoredPort>> {
        self.query_ports(SELECT_COLUMNS)
    }

    /// Look up a single port.
    pub fn get_port(&self, port: u16) -> Result<Option<MonitoredPort>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!("{SELECT_COLUMNS} WHERE port = ?1"))?;
        let row = stmt.query_row(params![port], map_port_row).optional()?;
        Ok(row)
    }

    /// Overwrite the stored cumulative counters for a port.
    pub fn update_usage(&self, port: u16, total_rx: u64, total_tx: u64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE ports SET total_rx = ?1, total_tx = ?2 WHERE port = ?3",
            params![total_rx, total_tx, port],
        )?;
        Ok(())
    }

    /// Flag a port as blocked so the monitor stops polling it.
    pub fn mark_blocked(&self, port: u16) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE ports SET is_blocked = 1 WHERE port = ?1",
            params![port],
        )?;
        Ok(())
    }

    /// Remove a port. Returns the number of rows deleted (0 if it was never registered).
    pub fn delete_port(&self, port: u16) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM ports WHERE port = ?1", params![port])?;
        Ok(deleted)
    }

    fn query_ports(&self, sql: &str) -> Result<Vec<MonitoredPort>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map([], map_port_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::super::tests::open_memory_db;
    use super::UndecodableRow;

    #[test]
    fn test_upsert_and_list_all_ports() {
        let db = open_memory_db();

        db.upsert_port(80, 1_000, Some(60), None).unwrap();
        db.upsert_port(443, 1_001, None, Some(500)).unwrap();
        db.upsert_port(8080, 1_002, Some(30), Some(10)).unwrap();

        let rows = db.list_all().unwrap();
        let ports: HashSet<u16> = rows.iter().map(|r| r.port).collect();
        assert_eq!(ports, HashSet::from([80, 443, 8080]));

        let http = rows.iter().find(|r| r.port == 80).unwrap();
        assert_eq!(http.time_limit_min, Some(60));
        assert_eq!(http.data_limit_mb, None);
        assert_eq!(http.added_at, 1_000);

        let https = rows.iter().find(|r| r.port == 443).unwrap();
        assert_eq!(https.time_limit_min, None);
        assert_eq!(https.data_limit_mb, Some(500));

        let alt = rows.iter().find(|r| r.port == 8080).unwrap();
        assert_eq!(alt.time_limit_min, Some(30));
        assert_eq!(alt.data_limit_mb, Some(10));
        assert!(rows.iter().all(|r| !r.is_blocked && r.total_bytes() == 0));
    }

    #[test]
    fn test_upsert_resets_usage_and_blocked_flag() {
        let db = open_memory_db();

        db.upsert_port(8080, 1_000, Some(60), Some(100)).unwrap();
        db.update_usage(8080, 5_000, 7_000).unwrap();
        db.mark_blocked(8080).unwrap();

        // Re-registering is a full reset, not a merge.
        db.upsert_port(8080, 2_000, None, Some(5)).unwrap();

        let rows = db.list_all().unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.added_at, 2_000);
        assert_eq!(row.time_limit_min, None);
        assert_eq!(row.data_limit_mb, Some(5));
        assert_eq!(row.total_rx, 0);
        assert_eq!(row.total_tx, 0);
        assert!(!row.is_blocked);
    }

    #[test]
    fn test_list_unblocked_excludes_blocked_ports() {
        let db = open_memory_db();

        db.upsert_port(22, 0, None, None).unwrap();
        db.upsert_port(25, 0, None, None).unwrap();
        db.mark_blocked(25).unwrap();

        let unblocked = db.list_unblocked().unwrap();
        assert_eq!(unblocked.len(), 1);
        assert_eq!(unblocked[0].port, 22);

        // list_all still shows the blocked port.
        assert_eq!(db.list_all().unwrap().len(), 2);
    }

    #[test]
    fn test_update_usage_overwrites_counters() {
        let db = open_memory_db();

        db.upsert_port(9000, 0, None, None).unwrap();
        db.update_usage(9000, 100, 200).unwrap();
        db.update_usage(9000, 150, 260).unwrap();

        let row = db.get_port(9000).unwrap().unwrap();
        assert_eq!(row.total_rx, 150);
        assert_eq!(row.total_tx, 260);
    }

    #[test]
    fn test_delete_port_removes_row() {
        let db = open_memory_db();

        db.upsert_port(3000, 0, Some(1), None).unwrap();
        assert_eq!(db.delete_port(3000).unwrap(), 1);
        assert!(db.get_port(3000).unwrap().is_none());
        assert!(db.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_delete_unknown_port_is_noop() {
        let db = open_memory_db();
        db.upsert_port(80, 0, None, None).unwrap();

        assert_eq!(db.delete_port(12345).unwrap(), 0);
        assert_eq!(db.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_large_counters_round_trip() {
        let db = open_memory_db();
        db.upsert_port(443, 0, None, None).unwrap();

        let ten_tib = 10u64 * 1024 * 1024 * 1024 * 1024;
        db.update_usage(443, ten_tib, ten_tib + 1).unwrap();

        let row = db.get_port(443).unwrap().unwrap();
        assert_eq!(row.total_rx, ten_tib);
        assert_eq!(row.total_tx, ten_tib + 1);
    }

    #[test]
    fn test_scan_unblocked_reports_malformed_rows_in_place() {
        let db = open_memory_db();
        db.upsert_port(80, 1_000, Some(5), None).unwrap();
        db.execute_raw(
            "INSERT INTO ports (port, added_at, total_rx, total_tx, is_blocked)
             VALUES (81, '2024-01-01T00:00:00', 0, 0, 0)",
        );
        db.execute_raw(
            "INSERT INTO ports (port, added_at, total_rx, total_tx, is_blocked)
             VALUES (82, 1000, -5, 0, 0)",
        );

        let mut scanned = db.scan_unblocked().unwrap();
        scanned.sort_by_key(|r| match r {
            Ok(p) => i64::from(p.port),
            Err(bad) => bad.port.unwrap_or(-1),
        });
        assert_eq!(scanned.len(), 3);
        assert_eq!(scanned[0].as_ref().unwrap().port, 80);
        assert!(matches!(&scanned[1], Err(UndecodableRow { port: Some(81), .. })));
        assert!(matches!(&scanned[2], Err(UndecodableRow { port: Some(82), .. })));

        // The strict listing still refuses the table as a whole.
        assert!(db.list_unblocked().is_err());
    }
}
