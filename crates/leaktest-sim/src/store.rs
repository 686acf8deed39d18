//! Append-only JSON-lines result store.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use leaktest_core::{RecordId, ResultStore, RunRecord, StoreError};

/// One record per line, appended to a plain text file.
pub struct JsonlStore {
    path: PathBuf,
    saved: u64,
}

impl JsonlStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path, saved: 0 }
    }

    /// Results file in the platform data directory, falling back to the
    /// working directory.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "leaktest")
            .map(|dirs| dirs.data_dir().join("results.jsonl"))
            .unwrap_or_else(|| PathBuf::from("results.jsonl"))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl ResultStore for JsonlStore {
    fn save(&mut self, record: &RunRecord) -> Result<RecordId, StoreError> {
        let json = record
            .to_json()
            .map_err(|e| StoreError::Rejected(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StoreError::unavailable(e.to_string()))?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::unavailable(e.to_string()))?;
        writeln!(file, "{json}").map_err(|e| StoreError::unavailable(e.to_string()))?;
        self.saved += 1;
        Ok(RecordId(self.saved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leaktest_core::{ChamberSummary, TestConfig};

    #[test]
    fn appends_one_line_per_record() {
        let dir = std::env::temp_dir().join("leaktest-sim-store-test");
        let path = dir.join("results.jsonl");
        let _ = fs::remove_file(&path);

        let config = TestConfig::default();
        let chambers = std::array::from_fn(|i| ChamberSummary::disabled(&config.chambers[i]));
        let record = RunRecord::assemble(&config, String::from("t"), false, None, chambers);

        let mut store = JsonlStore::new(path.clone());
        assert_eq!(store.save(&record).unwrap(), RecordId(1));
        assert_eq!(store.save(&record).unwrap(), RecordId(2));

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        let back = RunRecord::from_json(contents.lines().next().unwrap()).unwrap();
        assert_eq!(back, record);
    }
}
