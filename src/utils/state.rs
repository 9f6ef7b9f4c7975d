use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StateError;
use crate::utils::{write_atomic, MonitorLogger};

/// Durable JSON snapshot for one monitor.
///
/// Loading is forgiving: a missing, unreadable or corrupt document yields the
/// type's default (empty) value. Saving is best-effort and only logs failures.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    logger: MonitorLogger,
}

impl StateStore {
    /// Store backed by `<data_dir>/<name>_state.json`
    pub fn new(name: &str, data_dir: &Path, logger: MonitorLogger) -> Self {
        Self {
            path: data_dir.join(format!("{}_state.json", name)),
            logger,
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load<T: DeserializeOwned + Default>(&self) -> T {
        match self.try_load() {
            Ok(Some(doc)) => doc,
            Ok(None) => T::default(),
            Err(e) => {
                self.logger.log(&format!("State file unreadable, starting fresh: {}", e));
                T::default()
            }
        }
    }

    pub fn save<T: Serialize>(&self, doc: &T) -> bool {
        match self.try_save(doc) {
            Ok(()) => true,
            Err(e) => {
                self.logger.log(&format!("Error saving state: {}", e));
                false
            }
        }
    }

    fn try_load<T: DeserializeOwned>(&self) -> Result<Option<T>, StateError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn try_save<T: Serialize>(&self, doc: &T) -> Result<(), StateError> {
        let data = serde_json::to_string_pretty(doc)?;
        write_atomic(&self.path, &data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;

    fn store(dir: &Path) -> StateStore {
        StateStore::new("test", dir, MonitorLogger::new("test", dir))
    }

    #[test]
    fn save_then_load_in_fresh_instance_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let doc = json!({
            "Taylor Swift": {"event_ids": ["e1", "e2"], "last_check": "2024-05-01T10:00:00+00:00"}
        });

        assert!(store(dir.path()).save(&doc));
        let loaded: Value = store(dir.path()).load();

        assert_eq!(loaded, doc);
    }

    #[test]
    fn missing_file_loads_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: BTreeMap<String, Value> = store(dir.path()).load();
        assert!(loaded.is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        fs::write(store.path(), "{ not json").unwrap();

        let loaded: BTreeMap<String, Value> = store.load();

        assert!(loaded.is_empty());
    }

    #[test]
    fn save_failure_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        // a directory squatting on the target path makes the rename fail
        let store = store(dir.path());
        fs::create_dir_all(store.path()).unwrap();
        fs::write(store.path().join("occupied"), "x").unwrap();

        assert!(!store.save(&json!({"hash": "abc"})));
    }
}
