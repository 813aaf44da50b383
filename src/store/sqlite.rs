// SQLite backend - processed_reports table with a UNIQUE receipt id
// Marking is insert-or-ignore, so a second mark of the same id is a no-op.
// A mark whose INSERT fails is held in memory (still counts as announced)
// and retried before every later mark.

use super::{ensure_parent_dir, AnnouncementStore};
use crate::disclosure::DisclosureRecord;
use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One announced filing as stored in processed_reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedReport {
    pub receipt_id: String,
    pub entity_code: String,
    pub entity_name: String,
    pub ticker_code: Option<String>,
    pub report_title: String,
    pub receipt_date: String,
    pub processed_at: DateTime<Utc>,
    pub notified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub total_reports: i64,
    pub total_companies: i64,
}

pub struct SqliteStore {
    conn: Connection,
    location: Option<PathBuf>,
    /// Announced but not yet written: receipt_id -> row
    unflushed: HashMap<String, ProcessedReport>,
}

/// Fixed-width UTC timestamps so text comparison matches time order
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS processed_reports (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rcept_no TEXT UNIQUE NOT NULL,
            corp_code TEXT NOT NULL DEFAULT '',
            corp_name TEXT NOT NULL DEFAULT '',
            stock_code TEXT,
            report_nm TEXT NOT NULL DEFAULT '',
            rcept_dt TEXT NOT NULL DEFAULT '',
            processed_at TEXT NOT NULL,
            notified INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_processed_at ON processed_reports(processed_at)",
        [],
    )?;

    Ok(())
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        ensure_parent_dir(path)?;

        let conn = Connection::open(path)?;
        setup_database(&conn)?;

        Ok(SqliteStore {
            conn,
            location: Some(path.to_path_buf()),
            unflushed: HashMap::new(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;

        Ok(SqliteStore {
            conn,
            location: None,
            unflushed: HashMap::new(),
        })
    }

    fn insert(&self, record: &ProcessedReport) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT INTO processed_reports (
                rcept_no, corp_code, corp_name, stock_code, report_nm, rcept_dt, processed_at, notified
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(rcept_no) DO NOTHING",
            params![
                record.receipt_id,
                record.entity_code,
                record.entity_name,
                record.ticker_code,
                record.report_title,
                record.receipt_date,
                timestamp(record.processed_at),
                record.notified,
            ],
        )?;

        Ok(changed > 0)
    }

    /// Retry every held-back row. Rows that still fail stay held.
    fn flush(&mut self) {
        if self.unflushed.is_empty() {
            return;
        }

        let pending: Vec<ProcessedReport> = self.unflushed.values().cloned().collect();
        for report in pending {
            match self.insert(&report) {
                Ok(_) => {
                    self.unflushed.remove(&report.receipt_id);
                }
                Err(e) => {
                    debug!(receipt_id = %report.receipt_id, error = %e, "Held-back row still unwritable");
                }
            }
        }
    }

    fn record(&mut self, report: ProcessedReport) -> Result<bool> {
        self.flush();

        if self.unflushed.contains_key(&report.receipt_id) {
            return Ok(false);
        }

        match self.insert(&report) {
            Ok(inserted) => Ok(inserted),
            Err(e) => {
                self.unflushed.insert(report.receipt_id.clone(), report);
                Err(e)
            }
        }
    }

    /// Rows announced in this process whose write has not succeeded yet
    pub fn unflushed_count(&self) -> usize {
        self.unflushed.len()
    }

    /// Most recently processed first
    pub fn recent_reports(&self, limit: usize) -> Result<Vec<ProcessedReport>> {
        let mut stmt = self.conn.prepare(
            "SELECT rcept_no, corp_code, corp_name, stock_code, report_nm, rcept_dt, processed_at, notified
             FROM processed_reports
             ORDER BY processed_at DESC, id DESC
             LIMIT ?1",
        )?;

        let reports = stmt
            .query_map(params![limit as i64], |row| {
                let processed_at_str: String = row.get(6)?;
                let processed_at = DateTime::parse_from_rfc3339(&processed_at_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            6,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;

                Ok(ProcessedReport {
                    receipt_id: row.get(0)?,
                    entity_code: row.get(1)?,
                    entity_name: row.get(2)?,
                    ticker_code: row.get(3)?,
                    report_title: row.get(4)?,
                    receipt_date: row.get(5)?,
                    processed_at,
                    notified: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(reports)
    }

    pub fn statistics(&self) -> Result<StoreStatistics> {
        let (total_reports, total_companies) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT NULLIF(corp_code, '')) FROM processed_reports",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(StoreStatistics {
            total_reports,
            total_companies,
        })
    }
}

impl AnnouncementStore for SqliteStore {
    fn is_announced(&self, receipt_id: &str) -> bool {
        if self.unflushed.contains_key(receipt_id) {
            return true;
        }

        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM processed_reports WHERE rcept_no = ?1",
                params![receipt_id],
                |_| Ok(()),
            )
            .optional();

        match found {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(receipt_id, error = %e, "Lookup failed, treating as not announced");
                false
            }
        }
    }

    fn mark_announced_at(&mut self, receipt_id: &str, at: DateTime<Utc>) -> Result<bool> {
        self.record(ProcessedReport {
            receipt_id: receipt_id.to_string(),
            entity_code: String::new(),
            entity_name: String::new(),
            ticker_code: None,
            report_title: String::new(),
            receipt_date: String::new(),
            processed_at: at,
            notified: true,
        })
    }

    fn mark_record(&mut self, record: &DisclosureRecord) -> Result<bool> {
        self.record(ProcessedReport {
            receipt_id: record.receipt_id.clone(),
            entity_code: record.entity_code.clone(),
            entity_name: record.entity_name.clone(),
            ticker_code: record.ticker_code.clone(),
            report_title: record.report_title.clone(),
            receipt_date: record.receipt_date.clone(),
            processed_at: Utc::now(),
            notified: true,
        })
    }

    fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let held = self.unflushed.len();
        self.unflushed.retain(|_, report| report.processed_at >= cutoff);
        let dropped = held - self.unflushed.len();

        let removed = self.conn.execute(
            "DELETE FROM processed_reports WHERE processed_at < ?1",
            params![timestamp(cutoff)],
        )?;
        Ok(removed + dropped)
    }

    fn len(&self) -> usize {
        match self
            .conn
            .query_row("SELECT COUNT(*) FROM processed_reports", [], |row| row.get::<_, i64>(0))
        {
            Ok(count) => count as usize + self.unflushed.len(),
            Err(e) => {
                warn!(error = %e, "Count failed");
                self.unflushed.len()
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.conn.execute("DELETE FROM processed_reports", [])?;
        self.unflushed.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.location {
            Some(path) => format!("sqlite:{}", path.display()),
            None => "sqlite::memory:".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_test_record(receipt_id: &str, code: &str, name: &str) -> DisclosureRecord {
        DisclosureRecord {
            entity_code: code.to_string(),
            entity_name: name.to_string(),
            ticker_code: None,
            report_title: "감사보고서 (2024.12)".to_string(),
            receipt_id: receipt_id.to_string(),
            submitter_name: "회계법인".to_string(),
            receipt_date: "20250301".to_string(),
            remark: String::new(),
        }
    }

    #[test]
    fn test_idempotency_mark_twice() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let record = create_test_record("20250301000001", "00434003", "가나골프");

        assert!(store.mark_record(&record).unwrap());
        assert!(!store.mark_record(&record).unwrap());
        assert!(!store.mark_announced("20250301000001").unwrap());

        assert_eq!(store.len(), 1);
        assert!(store.is_announced("20250301000001"));
    }

    #[test]
    fn test_filter_new_is_read_only() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.mark_announced("B").unwrap();

        let batch = vec![
            create_test_record("A", "1", "가"),
            create_test_record("B", "2", "나"),
            create_test_record("C", "3", "다"),
        ];

        let first = store.filter_new(&batch);
        let second = store.filter_new(&batch);

        let ids: Vec<&str> = first.iter().map(|r| r.receipt_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_prune_before_cutoff() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();

        store.mark_announced_at("new", now - Duration::days(2)).unwrap();
        store.mark_announced_at("old", now - Duration::days(9)).unwrap();

        assert_eq!(store.prune_older_than(Duration::days(7)).unwrap(), 1);
        assert!(store.is_announced("new"));
        assert!(!store.is_announced("old"));
    }

    #[test]
    fn test_recent_reports_and_statistics() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.mark_record(&create_test_record("A", "00434003", "가나골프")).unwrap();
        store.mark_record(&create_test_record("B", "00434003", "가나골프")).unwrap();
        store.mark_record(&create_test_record("C", "00434004", "다라골프")).unwrap();

        let recent = store.recent_reports(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].receipt_id, "C");
        assert!(recent[0].notified);

        let stats = store.statistics().unwrap();
        assert_eq!(stats.total_reports, 3);
        assert_eq!(stats.total_companies, 2);
    }

    #[test]
    fn test_failed_write_still_counts_as_announced() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.conn.execute_batch("PRAGMA query_only = ON").unwrap();

        let record = create_test_record("X1", "00434003", "가나골프");
        assert!(store.mark_record(&record).is_err());

        assert!(store.is_announced("X1"));
        assert!(store.filter_new(&[record.clone()]).is_empty());
        assert_eq!(store.len(), 1);
        assert_eq!(store.unflushed_count(), 1);

        // Marking again while the row is held back is a no-op
        assert!(!store.mark_record(&record).unwrap());

        store.conn.execute_batch("PRAGMA query_only = OFF").unwrap();
        store.mark_announced("Y1").unwrap();

        assert_eq!(store.unflushed_count(), 0);
        let stored: Vec<String> = store
            .recent_reports(10)
            .unwrap()
            .into_iter()
            .map(|r| r.receipt_id)
            .collect();
        assert!(stored.contains(&"X1".to_string()));
        assert_eq!(store.statistics().unwrap().total_reports, 2);
    }

    #[test]
    fn test_durable_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit-watch.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.mark_announced("20250301000001").unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.is_announced("20250301000001"));
        assert!(store.describe().starts_with("sqlite:"));
    }
}
