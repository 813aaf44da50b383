// Single JSON document: {sent_ids, last_updated, total_count, announced_at}
// Rewritten atomically (temp file + rename) on every mutation.

use super::{ensure_parent_dir, AnnouncementStore, TrackingSet};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    #[serde(alias = "sent_rcpnos", default)]
    sent_ids: Vec<String>,

    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,

    #[serde(default)]
    total_count: usize,

    /// Older documents only carry ids; those get `last_updated` as their timestamp
    #[serde(default)]
    announced_at: BTreeMap<String, DateTime<Utc>>,
}

pub struct JsonStore {
    path: PathBuf,
    set: TrackingSet,
}

impl JsonStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut set = TrackingSet::new();

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let doc: StateDocument = serde_json::from_str(&content)?;
            let fallback = doc.last_updated.unwrap_or_else(Utc::now);

            for id in &doc.sent_ids {
                let at = doc.announced_at.get(id).copied().unwrap_or(fallback);
                set.insert(id, at);
            }
        }

        Ok(JsonStore { path, set })
    }

    pub fn detached<P: AsRef<Path>>(path: P) -> Self {
        JsonStore {
            path: path.as_ref().to_path_buf(),
            set: TrackingSet::new(),
        }
    }

    fn save(&self) -> Result<()> {
        ensure_parent_dir(&self.path)?;

        let sorted = self.set.sorted();
        let doc = StateDocument {
            sent_ids: sorted.iter().map(|(id, _)| id.to_string()).collect(),
            last_updated: Some(Utc::now()),
            total_count: sorted.len(),
            announced_at: sorted.iter().map(|(id, at)| (id.to_string(), *at)).collect(),
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(serde_json::to_string_pretty(&doc)?.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        Ok(())
    }
}

impl AnnouncementStore for JsonStore {
    fn is_announced(&self, receipt_id: &str) -> bool {
        self.set.contains(receipt_id)
    }

    fn mark_announced_at(&mut self, receipt_id: &str, at: DateTime<Utc>) -> Result<bool> {
        if !self.set.insert(receipt_id, at) {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let removed = self.set.remove_before(cutoff);
        if removed > 0 {
            self.save()?;
        }
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.set.len()
    }

    fn reset(&mut self) -> Result<()> {
        self.set.clear();
        self.save()
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = JsonStore::open(&path).unwrap();
        assert!(store.mark_announced("20250301000001").unwrap());
        assert!(!store.mark_announced("20250301000001").unwrap());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["total_count"], 1);
        assert_eq!(raw["sent_ids"][0], "20250301000001");

        let reopened = JsonStore::open(&path).unwrap();
        assert!(reopened.is_announced("20250301000001"));
    }

    #[test]
    fn test_reads_legacy_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"sent_rcpnos": ["A", "B"], "last_updated": "2025-03-01T09:00:00Z", "total_count": 2}"#,
        )
        .unwrap();

        let mut store = JsonStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);

        // Legacy ids inherit last_updated, so a cutoff after it drops them
        let cutoff = DateTime::parse_from_rfc3339("2025-03-02T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(store.prune_before(cutoff).unwrap(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_prune_keeps_recent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let now = Utc::now();

        let mut store = JsonStore::open(&path).unwrap();
        store.mark_announced_at("old", now - Duration::days(10)).unwrap();
        store.mark_announced_at("new", now).unwrap();

        assert_eq!(store.prune_older_than(Duration::days(7)).unwrap(), 1);
        assert!(JsonStore::open(&path).unwrap().is_announced("new"));
        assert!(!JsonStore::open(&path).unwrap().is_announced("old"));
    }
}
