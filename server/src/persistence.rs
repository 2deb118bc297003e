//! Best-score persistence for one installation.

use crate::error::StoreError;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const BEST_SCORE_KEY: &str = "TRASHGAME_BEST_SCORE";

/// Read once at server start, written on every improvement.
pub trait BestScoreStore: Send {
    fn load(&self) -> Result<u32, StoreError>;
    fn save(&mut self, best: u32) -> Result<(), StoreError>;
}

/// Keeps integer values in a small JSON object, one key per value.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    key: String,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_key(path, BEST_SCORE_KEY)
    }

    pub fn with_key(path: impl Into<PathBuf>, key: &str) -> Self {
        Self {
            path: path.into(),
            key: key.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, u32>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl BestScoreStore for JsonFileStore {
    fn load(&self) -> Result<u32, StoreError> {
        Ok(self.read_entries()?.get(&self.key).copied().unwrap_or(0))
    }

    fn save(&mut self, best: u32) -> Result<(), StoreError> {
        // Keep other keys intact, but never let a corrupt file block the save.
        let mut entries = self.read_entries().unwrap_or_default();
        entries.insert(self.key.clone(), best);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    best: u32,
    saves: usize,
}

/// In-process store. Clones share state, so a test can keep a handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new(best: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState { best, saves: 0 })),
        }
    }

    pub fn best(&self) -> u32 {
        self.state.lock().map(|state| state.best).unwrap_or(0)
    }

    pub fn saves(&self) -> usize {
        self.state.lock().map(|state| state.saves).unwrap_or(0)
    }
}

impl BestScoreStore for MemoryStore {
    fn load(&self) -> Result<u32, StoreError> {
        Ok(self.best())
    }

    fn save(&mut self, best: u32) -> Result<(), StoreError> {
        if let Ok(mut state) = self.state.lock() {
            state.best = best;
            state.saves += 1;
        }
        Ok(())
    }
}
