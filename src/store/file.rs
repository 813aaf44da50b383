// Append-only `id|timestamp` log
//
// Every mark appends one line and fsyncs. Pruning and reset are log
// compactions: the surviving entries are written to a temp file next to the
// log, synced, and renamed over it, so a crash mid-rewrite leaves either the
// old log or the new one.

use super::{ensure_parent_dir, AnnouncementStore, TrackingSet};
use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct FileStore {
    path: PathBuf,
    set: TrackingSet,
    /// Next write rewrites the whole log instead of appending
    rewrite_pending: bool,
}

impl FileStore {
    /// Load an existing log, or start empty when the file does not exist yet
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut set = TrackingSet::new();

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let loaded_at = Utc::now();

            for (idx, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match line.split_once('|') {
                    Some((id, ts)) => match DateTime::parse_from_rfc3339(ts.trim()) {
                        Ok(at) => {
                            set.insert(id.trim(), at.with_timezone(&Utc));
                        }
                        Err(e) => {
                            warn!(line = idx + 1, error = %e, "Skipping malformed state line");
                        }
                    },
                    // One id per line, no timestamp
                    None => {
                        set.insert(line, loaded_at);
                    }
                }
            }
        }

        debug!(path = %path.display(), tracked = set.len(), "File store loaded");
        Ok(FileStore {
            path,
            set,
            rewrite_pending: false,
        })
    }

    /// Empty store bound to `path`, used when the existing log could not be read.
    /// Its first write replaces whatever is at `path`, so the unreadable log
    /// never survives into the next start.
    pub fn detached<P: AsRef<Path>>(path: P) -> Self {
        FileStore {
            path: path.as_ref().to_path_buf(),
            set: TrackingSet::new(),
            rewrite_pending: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, receipt_id: &str, at: DateTime<Utc>) -> Result<()> {
        ensure_parent_dir(&self.path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}|{}", receipt_id, at.to_rfc3339_opts(SecondsFormat::Secs, true))?;
        file.sync_all()?;

        Ok(())
    }

    /// Rewrite the whole log from the in-memory set (write temp, fsync, rename)
    fn compact(&self) -> Result<()> {
        ensure_parent_dir(&self.path)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        for (id, at) in self.set.sorted() {
            writeln!(tmp, "{}|{}", id, at.to_rfc3339_opts(SecondsFormat::Secs, true))?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        Ok(())
    }
}

impl AnnouncementStore for FileStore {
    fn is_announced(&self, receipt_id: &str) -> bool {
        self.set.contains(receipt_id)
    }

    fn mark_announced_at(&mut self, receipt_id: &str, at: DateTime<Utc>) -> Result<bool> {
        if !self.set.insert(receipt_id, at) {
            return Ok(false);
        }

        // On a failed write the id stays tracked in memory for the life of the process
        if self.rewrite_pending {
            self.compact()?;
            self.rewrite_pending = false;
        } else {
            self.append(receipt_id, at)?;
        }
        Ok(true)
    }

    fn prune_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let removed = self.set.remove_before(cutoff);
        if removed > 0 {
            self.compact()?;
            self.rewrite_pending = false;
        }
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.set.len()
    }

    fn reset(&mut self) -> Result<()> {
        self.set.clear();
        self.compact()?;
        self.rewrite_pending = false;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
