//! Bounded query/response history with pluggable persistence

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::HistoryError;

pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// One completed exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub query: String,
    pub response: String,
}

/// Durable backing store for the history list
pub trait HistoryStorage: Send + Sync {
    fn load(&self) -> Result<Vec<HistoryEntry>, HistoryError>;
    fn save(&self, entries: &[HistoryEntry]) -> Result<(), HistoryError>;
    fn clear(&self) -> Result<(), HistoryError>;
}

/// History persisted as a JSON array in a single file
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HistoryStorage for JsonFileStorage {
    fn load(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), HistoryError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local storage, used in tests and when no history file is configured
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl HistoryStorage for MemoryStorage {
    fn load(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        Ok(self.snapshot())
    }

    fn save(&self, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
        if let Ok(mut stored) = self.entries.lock() {
            *stored = entries.to_vec();
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), HistoryError> {
        if let Ok(mut stored) = self.entries.lock() {
            stored.clear();
        }
        Ok(())
    }
}

/// Keeps at most `limit` entries, oldest first, and writes through to storage
/// after every change. Storage failures are logged and never surface to the
/// chat flow.
pub struct HistoryManager {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
    storage: Box<dyn HistoryStorage>,
}

impl HistoryManager {
    /// Load persisted entries; unreadable history starts empty
    pub fn load(storage: Box<dyn HistoryStorage>, limit: usize) -> Self {
        let limit = limit.max(1);
        let mut loaded = match storage.load() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring unreadable chat history: {}", e);
                Vec::new()
            }
        };
        if loaded.len() > limit {
            loaded.drain(..loaded.len() - limit);
        }
        debug!("Loaded {} history entries", loaded.len());

        Self {
            entries: loaded.into(),
            limit,
            storage,
        }
    }

    pub fn push(&mut self, query: impl Into<String>, response: impl Into<String>) {
        self.entries.push_back(HistoryEntry {
            query: query.into(),
            response: response.into(),
        });
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
        self.persist();
    }

    /// The entry folded into the next request as context
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empty both the in-memory list and the store
    pub fn clear(&mut self) {
        self.entries.clear();
        if let Err(e) = self.storage.clear() {
            warn!("Failed to clear stored chat history: {}", e);
        }
    }

    fn persist(&self) {
        let entries: Vec<HistoryEntry> = self.entries.iter().cloned().collect();
        if let Err(e) = self.storage.save(&entries) {
            warn!("Failed to save chat history: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Shares one `MemoryStorage` between the manager and the test
    struct Shared(Arc<MemoryStorage>);

    impl HistoryStorage for Shared {
        fn load(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
            self.0.load()
        }
        fn save(&self, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
            self.0.save(entries)
        }
        fn clear(&self) -> Result<(), HistoryError> {
            self.0.clear()
        }
    }

    #[test]
    fn test_eleventh_entry_drops_oldest() {
        let store = Arc::new(MemoryStorage::new());
        let mut history = HistoryManager::load(Box::new(Shared(store.clone())), DEFAULT_HISTORY_LIMIT);

        for i in 0..11 {
            history.push(format!("q{i}"), format!("r{i}"));
        }

        assert_eq!(history.len(), 10);
        assert_eq!(history.get(0).unwrap().query, "q1");
        assert_eq!(history.latest().unwrap().query, "q10");

        let persisted = store.snapshot();
        assert_eq!(persisted.len(), 10);
        assert_eq!(persisted.first().unwrap().query, "q1");
        assert_eq!(persisted.last().unwrap().response, "r10");
    }

    #[test]
    fn test_clear_empties_memory_and_storage() {
        let store = Arc::new(MemoryStorage::new());
        let mut history = HistoryManager::load(Box::new(Shared(store.clone())), 10);
        history.push("q", "r");
        assert_eq!(store.snapshot().len(), 1);

        history.clear();
        assert!(history.is_empty());
        assert!(history.latest().is_none());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_file_storage_persists_across_loads() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("history.json");

        let mut history = HistoryManager::load(Box::new(JsonFileStorage::new(&path)), 10);
        history.push("what is rust", "a language");
        history.push("and tokio", "a runtime");

        let reloaded = HistoryManager::load(Box::new(JsonFileStorage::new(&path)), 10);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            reloaded.latest(),
            Some(&HistoryEntry {
                query: "and tokio".to_string(),
                response: "a runtime".to_string(),
            })
        );

        let mut reloaded = reloaded;
        reloaded.clear();
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("history.json");
        std::fs::write(&path, "{not json").unwrap();

        let mut history = HistoryManager::load(Box::new(JsonFileStorage::new(&path)), 10);
        assert!(history.is_empty());

        // The next successful exchange overwrites the corrupt file
        history.push("q", "r");
        let reloaded = HistoryManager::load(Box::new(JsonFileStorage::new(&path)), 10);
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_oversized_store_is_trimmed_on_load() {
        let store = MemoryStorage::new();
        let entries: Vec<HistoryEntry> = (0..15)
            .map(|i| HistoryEntry {
                query: format!("q{i}"),
                response: format!("r{i}"),
            })
            .collect();
        store.save(&entries).unwrap();

        let history = HistoryManager::load(Box::new(store), 10);
        assert_eq!(history.len(), 10);
        assert_eq!(history.get(0).unwrap().query, "q5");
    }

    #[test]
    fn test_unwritable_storage_is_not_fatal() {
        let tmp = TempDir::new().unwrap();
        // A directory where the file should be makes every write fail
        let path = tmp.path().join("history.json");
        std::fs::create_dir(&path).unwrap();

        let mut history = HistoryManager::load(Box::new(JsonFileStorage::new(&path)), 10);
        history.push("q", "r");
        assert_eq!(history.len(), 1);
    }
}
