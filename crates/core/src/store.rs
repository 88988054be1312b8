//! Persistent key-value state: the per-install client id and the last
//! connected socket URL.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

const CLIENT_ID_KEY: &str = "assurance.client.id";
const CONNECTED_URL_KEY: &str = "assurance.socket.url";

/// Minimal key-value storage.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store, lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// JSON file store. Every write rewrites the file through a temp file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Opens the store, starting empty when the file is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Discarding corrupt state file");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::storage(format!("{}: {e}", path.display()))),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| Error::storage(format!("{}: {e}", parent.display())))?;
        }

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let text = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text).map_err(|e| Error::storage(format!("{}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| Error::storage(format!("{}: {e}", self.path.display())))
    }
}

impl StateStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock();
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock();
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}

/// Typed view over a [`StateStore`].
#[derive(Clone)]
pub struct IdentityStore {
    store: Arc<dyn StateStore>,
}

impl IdentityStore {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Stable client id, generated and persisted on first use.
    pub fn client_id(&self) -> String {
        if let Some(id) = self.store.get(CLIENT_ID_KEY) {
            return id;
        }

        let id = Uuid::new_v4().to_string();
        if let Err(e) = self.store.set(CLIENT_ID_KEY, &id) {
            warn!(error = %e, "Failed to persist client id");
        }
        debug!(client_id = %id, "Generated client id");
        id
    }

    pub fn connected_url(&self) -> Option<String> {
        self.store.get(CONNECTED_URL_KEY)
    }

    pub fn save_connected_url(&self, url: &str) {
        if let Err(e) = self.store.set(CONNECTED_URL_KEY, url) {
            warn!(error = %e, "Failed to persist connected socket url");
        }
    }

    pub fn clear_connected_url(&self) {
        if let Err(e) = self.store.remove(CONNECTED_URL_KEY) {
            warn!(error = %e, "Failed to clear connected socket url");
        }
    }
}
