//! Key-value persistence for cache records and settings.
//!
//! The browser build kept these in local storage; here the store is an
//! injected trait so the poll controller runs against memory in tests and a
//! JSON file on the kiosk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use common::settings::SETTINGS_KEY;
use common::{DisplaySettings, Error};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// String key-value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, Error>;
    fn set(&self, key: &str, value: String) -> Result<(), Error>;
}

/// Read and decode a JSON value stored under `key`.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, Error> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode `value` as JSON under `key`.
pub fn save_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), Error> {
    store.set(key, serde_json::to_string(value)?)
}

/// Saved display settings merged over defaults. Unreadable settings are
/// logged and replaced by defaults.
pub fn load_settings(store: &dyn KeyValueStore) -> DisplaySettings {
    match load_json::<DisplaySettings>(store, SETTINGS_KEY) {
        Ok(Some(settings)) => settings,
        Ok(None) => DisplaySettings::default(),
        Err(e) => {
            warn!("Ignoring unreadable display settings: {}", e);
            DisplaySettings::default()
        }
    }
}

pub fn save_settings(store: &dyn KeyValueStore, settings: &DisplaySettings) -> Result<(), Error> {
    save_json(store, SETTINGS_KEY, settings)
}

// ── In-memory ─────────────────────────────────────────────────────────

/// Process-local store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: String) -> Result<(), Error> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

// ── File-backed ───────────────────────────────────────────────────────

/// One JSON object file mapping keys to string values.
///
/// Every `set` rewrites the whole file through a temporary sibling and a
/// rename. A corrupt file reads as an error and is replaced on the next `set`.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, Error> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents).map_err(|e| {
            Error::Store(format!("corrupt store file {}: {}", self.path.display(), e))
        })
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| Error::Store("store lock poisoned".into()))?;
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: String) -> Result<(), Error> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| Error::Store("store lock poisoned".into()))?;
        let mut entries = match self.read_all() {
            Ok(entries) => entries,
            Err(Error::Store(msg)) => {
                warn!("{}; rewriting", msg);
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        entries.insert(key.to_string(), value);
        self.write_all(&entries)?;
        debug!("Stored key {} in {}", key, self.path.display());
        Ok(())
    }
}
