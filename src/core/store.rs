use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::core::ent::ProbeResult;
use crate::core::storage::{read_json, write_json};

/// Shared handle used by the loops and the HTTP handlers.
pub type SharedStore = Arc<RwLock<LogStore>>;

/// Append-only probe log, mirrored to a JSON file after every write.
pub struct LogStore {
    path: PathBuf,
    entries: Vec<ProbeResult>,
}

impl LogStore {
    /// Loads the log at `path`; a missing or corrupt file starts an empty log.
    pub fn open(path: impl Into<PathBuf>) -> LogStore {
        let path = path.into();
        let entries = read_json::<Vec<ProbeResult>>(&path).unwrap_or_default();
        info!("log store {} opened with {} entries", path.display(), entries.len());
        LogStore { path, entries }
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn append(&mut self, result: ProbeResult) {
        self.entries.push(result);
        self.persist();
    }

    /// Entries with `start <= timestamp <= end`; a missing bound is open.
    pub fn query(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Vec<ProbeResult> {
        self.entries
            .iter()
            .filter(|e| start.map_or(true, |s| e.timestamp >= s))
            .filter(|e| end.map_or(true, |t| e.timestamp <= t))
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
        info!("log store {} cleared", self.path.display());
    }

    // A failed write keeps the in-memory log; the next append retries it.
    fn persist(&self) {
        match write_json(&self.path, &self.entries) {
            Ok(()) => debug!("saved {} entries to {}", self.entries.len(), self.path.display()),
            Err(err) => error!("failed to save log to {}: {}", self.path.display(), err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ent::{Method, ProbeStatus};
    use chrono::{Duration, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn entry(hour: u32) -> ProbeResult {
        ProbeResult {
            endpoint: "/ping".to_string(),
            method: Method::Get,
            status: ProbeStatus::Up,
            response_time_ms: Some(40),
            status_code: Some(200),
            error: None,
            timestamp: at(hour),
        }
    }

    #[test]
    fn appends_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/uptime_logs.json");
        let mut store = LogStore::open(&path);
        assert!(store.is_empty());
        store.append(entry(1));
        store.append(entry(2));

        let reopened = LogStore::open(&path);
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.query(None, None), vec![entry(1), entry(2)]);
    }

    #[test]
    fn corrupt_file_starts_empty_and_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uptime_logs.json");
        std::fs::write(&path, "{ this is not json").unwrap();

        let mut store = LogStore::open(&path);
        assert!(store.is_empty());
        store.append(entry(3));
        assert_eq!(LogStore::open(&path).len(), 1);
    }

    #[test]
    fn query_bounds_are_inclusive_and_optional() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = LogStore::open(dir.path().join("log.json"));
        for hour in [1, 2, 3, 4] {
            store.append(entry(hour));
        }

        let hours = |v: Vec<ProbeResult>| v.iter().map(|e| e.timestamp).collect::<Vec<_>>();
        assert_eq!(hours(store.query(Some(at(2)), Some(at(3)))), vec![at(2), at(3)]);
        assert_eq!(hours(store.query(Some(at(3)), None)), vec![at(3), at(4)]);
        assert_eq!(hours(store.query(None, Some(at(1)))), vec![at(1)]);
        assert!(store
            .query(Some(at(4) + Duration::seconds(1)), None)
            .is_empty());
    }

    #[test]
    fn clear_empties_memory_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        let mut store = LogStore::open(&path);
        store.append(entry(1));
        store.clear();
        assert!(store.is_empty());
        assert!(LogStore::open(&path).is_empty());
    }
}
