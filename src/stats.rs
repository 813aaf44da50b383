// 📈 Run Statistics - per-run counters and the append-only JSONL run log

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub entities_watched: usize,
    /// After watch-list scoping, before the report-type filter
    pub disclosures_fetched: usize,
    pub audit_reports: usize,
    pub disclosures_new: usize,
    pub notifications_sent: usize,
    pub error_count: usize,
    /// Error that ended the run early, if any
    pub fault: Option<String>,
}

impl RunStatistics {
    pub fn start() -> Self {
        RunStatistics {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            entities_watched: 0,
            disclosures_fetched: 0,
            audit_reports: 0,
            disclosures_new: 0,
            notifications_sent: 0,
            error_count: 0,
            fault: None,
        }
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    pub fn record_fault(&mut self, fault: impl Into<String>) {
        self.fault = Some(fault.into());
        self.error_count += 1;
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    pub fn is_clean(&self) -> bool {
        self.error_count == 0 && self.fault.is_none()
    }
}

/// One JSON object per line, one line per run
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        RunLog {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, stats: &RunStatistics) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(stats)?)?;

        Ok(())
    }

    /// All recorded runs, oldest first. Unparsable lines are skipped.
    pub fn read_all(&self) -> Result<Vec<RunStatistics>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_counts_as_error() {
        let mut stats = RunStatistics::start();
        assert!(stats.is_clean());

        stats.record_fault("watch-list missing");
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.fault.as_deref(), Some("watch-list missing"));
        assert!(!stats.is_clean());
    }

    #[test]
    fn test_run_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::new(dir.path().join("logs").join("runs.jsonl"));

        let mut first = RunStatistics::start();
        first.disclosures_new = 2;
        first.finish();
        let second = RunStatistics::start();

        log.append(&first).unwrap();
        log.append(&second).unwrap();

        let runs = log.read_all().unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0], first);
        assert_ne!(runs[0].run_id, runs[1].run_id);
        assert!(runs[0].duration_ms().is_some());
    }
}
