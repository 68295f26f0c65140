//! External persistence of remembered form snapshots.
//!
//! A form constructed with a remember key seeds its initial state from a
//! [`RememberStore`] and writes a [`RememberedState`] back after mutations
//! and finished submissions. The store is an external collaborator; failures
//! to persist are logged by the coordinator, never surfaced as form errors.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The snapshot persisted for a remembered form: current data plus field
/// errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RememberedState {
    pub data: Map<String, Value>,
    pub errors: BTreeMap<String, String>,
}

/// Store for remembered snapshots, keyed by the form's remember key.
pub trait RememberStore: Send + Sync {
    /// Returns the stored snapshot for `key`, if any.
    fn load(&self, key: &str) -> Option<RememberedState>;

    /// Persists `snapshot` under `key`, replacing any previous one.
    fn save(&self, key: &str, snapshot: &RememberedState) -> Result<()>;
}

/// In-memory store. Useful for tests and single-process applications.
#[derive(Debug, Default)]
pub struct MemoryRememberStore {
    entries: Mutex<BTreeMap<String, RememberedState>>,
}

impl RememberStore for MemoryRememberStore {
    fn load(&self, key: &str) -> Option<RememberedState> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn save(&self, key: &str, snapshot: &RememberedState) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("remember store lock poisoned"))?
            .insert(key.to_string(), snapshot.clone());
        Ok(())
    }
}

/// File-backed store writing one JSON document per key under a base
/// directory.
#[derive(Debug)]
pub struct FileRememberStore {
    dir: PathBuf,
}

impl FileRememberStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    // Remember keys are caller-chosen; keep the file name flat and safe.
    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl RememberStore for FileRememberStore {
    fn load(&self, key: &str) -> Option<RememberedState> {
        let contents = fs::read_to_string(self.path_for(key)).ok()?;
        serde_json::from_str(&contents).ok()
    }

    fn save(&self, key: &str, snapshot: &RememberedState) -> Result<()> {
        fs::create_dir_all(&self.dir).context("creating remember store directory")?;
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(self.path_for(key), json).context("writing remembered snapshot")?;
        Ok(())
    }
}
