// 🔍 Announcement Store - which receipt ids already triggered a notification
//
// Filtering and recording are separate steps: a record is only marked after
// its notification actually went out. Three interchangeable backends share
// the same contract (durable across restart, O(1) membership, idempotent mark).

pub mod file;
pub mod json;
pub mod sqlite;

pub use file::FileStore;
pub use json::JsonStore;
pub use sqlite::SqliteStore;

use crate::disclosure::DisclosureRecord;
use crate::error::{MonitorError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

// ============================================================================
// STORE CONTRACT
// ============================================================================

pub trait AnnouncementStore: Send {
    /// Pure lookup
    fn is_announced(&self, receipt_id: &str) -> bool;

    /// Insert with an explicit timestamp. Returns false when the id was already present.
    fn mark_announced_at(&mut self, receipt_id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Remove tracking entries recorded strictly before `cutoff`
    fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Number of tracked ids
    fn len(&self) -> usize;

    /// Forget everything. Destructive.
    fn reset(&mut self) -> Result<()>;

    /// Backend name and location, for diagnostics
    fn describe(&self) -> String;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records whose receipt id is not yet announced, input order preserved. No side effects.
    fn filter_new(&self, records: &[DisclosureRecord]) -> Vec<DisclosureRecord> {
        records
            .iter()
            .filter(|r| !self.is_announced(&r.receipt_id))
            .cloned()
            .collect()
    }

    fn mark_announced(&mut self, receipt_id: &str) -> Result<bool> {
        self.mark_announced_at(receipt_id, Utc::now())
    }

    /// Mark a whole record. Backends that keep more than the id override this.
    fn mark_record(&mut self, record: &DisclosureRecord) -> Result<bool> {
        self.mark_announced(&record.receipt_id)
    }

    /// A retention reaching before the earliest representable time prunes nothing
    fn prune_older_than(&mut self, retention: Duration) -> Result<usize> {
        match Utc::now().checked_sub_signed(retention) {
            Some(cutoff) => self.prune_before(cutoff),
            None => Ok(0),
        }
    }
}

// ============================================================================
// IN-MEMORY TRACKING SET (shared by the file and JSON backends)
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct TrackingSet {
    entries: HashMap<String, DateTime<Utc>>,
}

impl TrackingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, receipt_id: &str) -> bool {
        self.entries.contains_key(receipt_id)
    }

    /// First timestamp wins
    pub fn insert(&mut self, receipt_id: &str, at: DateTime<Utc>) -> bool {
        if self.entries.contains_key(receipt_id) {
            return false;
        }
        self.entries.insert(receipt_id.to_string(), at);
        true
    }

    pub fn remove_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, at| *at >= cutoff);
        before - self.entries.len()
    }

    pub fn announced_at(&self, receipt_id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(receipt_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries ordered by timestamp, then id, so rewrites are deterministic
    pub fn sorted(&self) -> Vec<(&str, DateTime<Utc>)> {
        let mut entries: Vec<(&str, DateTime<Utc>)> =
            self.entries.iter().map(|(id, at)| (id.as_str(), *at)).collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}

// ============================================================================
// BACKEND SELECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreBackend {
    /// `id|timestamp` lines
    File,
    /// One JSON document
    Json,
    /// processed_reports table
    Sqlite,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::File => "file",
            StoreBackend::Json => "json",
            StoreBackend::Sqlite => "sqlite",
        }
    }
}

impl FromStr for StoreBackend {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" | "log" => Ok(StoreBackend::File),
            "json" => Ok(StoreBackend::Json),
            "sqlite" | "db" => Ok(StoreBackend::Sqlite),
            other => Err(MonitorError::Configuration(format!(
                "Unknown STATE_BACKEND '{}' (expected file, json or sqlite)",
                other
            ))),
        }
    }
}

/// Open the configured backend. An unreadable store is moved aside to
/// `<path>.corrupt` and replaced by an empty tracking set with a warning
/// instead of failing the run: every item is then treated as potentially new,
/// and the first write starts a fresh store at `path`.
pub fn open(backend: StoreBackend, path: &Path) -> Box<dyn AnnouncementStore> {
    let opened: Result<Box<dyn AnnouncementStore>> = match backend {
        StoreBackend::File => FileStore::open(path).map(|s| Box::new(s) as Box<dyn AnnouncementStore>),
        StoreBackend::Json => JsonStore::open(path).map(|s| Box::new(s) as Box<dyn AnnouncementStore>),
        StoreBackend::Sqlite => SqliteStore::open(path).map(|s| Box::new(s) as Box<dyn AnnouncementStore>),
    };

    match opened {
        Ok(store) => {
            info!(store = %store.describe(), tracked = store.len(), "State store opened");
            store
        }
        Err(e) => {
            warn!(
                backend = backend.as_str(),
                path = %path.display(),
                error = %e,
                "State store unreadable, starting from an empty tracking set"
            );
            quarantine(path);

            match backend {
                StoreBackend::File => Box::new(FileStore::detached(path)),
                StoreBackend::Json => Box::new(JsonStore::detached(path)),
                StoreBackend::Sqlite => match SqliteStore::open(path) {
                    Ok(store) => Box::new(store),
                    Err(e) => {
                        warn!(error = %e, "Cannot recreate SQLite store, falling back to memory");
                        match SqliteStore::open_in_memory() {
                            Ok(store) => Box::new(store),
                            Err(_) => Box::new(FileStore::detached(path)),
                        }
                    }
                },
            }
        }
    }
}

/// `<path>.corrupt`
pub fn quarantine_path(path: &Path) -> PathBuf {
    let mut aside = path.as_os_str().to_owned();
    aside.push(".corrupt");
    PathBuf::from(aside)
}

/// Move an unreadable store out of the way, keeping it for inspection
fn quarantine(path: &Path) {
    if !path.exists() {
        return;
    }

    let aside = quarantine_path(path);
    match std::fs::rename(path, &aside) {
        Ok(()) => warn!(from = %path.display(), to = %aside.display(), "Unreadable state moved aside"),
        Err(e) => warn!(path = %path.display(), error = %e, "Could not move unreadable state aside"),
    }
}

/// Create the parent directory of a store file if needed
pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_set_first_timestamp_wins() {
        let mut set = TrackingSet::new();
        let t1 = Utc::now() - Duration::days(3);
        let t2 = Utc::now();

        assert!(set.insert("A", t1));
        assert!(!set.insert("A", t2));
        assert_eq!(set.announced_at("A"), Some(t1));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_tracking_set_sorted_is_deterministic() {
        let mut set = TrackingSet::new();
        let t = Utc::now();
        set.insert("C", t);
        set.insert("B", t);
        set.insert("A", t - Duration::hours(1));

        let ids: Vec<&str> = set.sorted().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_huge_retention_prunes_nothing() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.mark_announced("A").unwrap();

        assert_eq!(store.prune_older_than(Duration::days(u32::MAX as i64)).unwrap(), 0);
        assert!(store.is_announced("A"));
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("SQLite".parse::<StoreBackend>().unwrap(), StoreBackend::Sqlite);
        assert_eq!("file".parse::<StoreBackend>().unwrap(), StoreBackend::File);
        assert_eq!("json".parse::<StoreBackend>().unwrap(), StoreBackend::Json);
        assert!("redis".parse::<StoreBackend>().unwrap_err().is_configuration());
    }

    #[test]
    fn test_open_falls_back_on_unreadable_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = open(StoreBackend::Json, &path);

        assert_eq!(store.len(), 0);
        assert!(!store.is_announced("20250101000001"));
        assert!(quarantine_path(&path).exists());
    }

    #[test]
    fn test_file_fallback_is_durable_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.log");
        std::fs::write(&path, b"A|2025-03-01T09:00:00Z\n\xff\xfe\n").unwrap();

        let mut store = open(StoreBackend::File, &path);
        assert!(store.is_empty());
        store.mark_announced("NEW1").unwrap();
        drop(store);

        let reopened = open(StoreBackend::File, &path);
        assert_eq!(reopened.len(), 1);
        assert!(reopened.is_announced("NEW1"));
        assert!(quarantine_path(&path).exists());
    }

    #[test]
    fn test_sqlite_fallback_recreates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit-watch.db");
        std::fs::write(&path, "this is not a database").unwrap();

        let mut store = open(StoreBackend::Sqlite, &path);
        assert!(store.describe().starts_with("sqlite:"));
        store.mark_announced("NEW1").unwrap();
        drop(store);

        let reopened = open(StoreBackend::Sqlite, &path);
        assert!(reopened.is_announced("NEW1"));
    }
}
