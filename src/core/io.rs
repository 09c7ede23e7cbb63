use crate::core::error::{BookError, BookResult};
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Small string key-value store used for credentials.
///
/// Callers must call [`KeyValueStore::init`] once on startup before reading.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn init(&self) -> BookResult<()>;
    async fn get(&self, key: &str) -> BookResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> BookResult<()>;
    async fn clear(&self, key: &str) -> BookResult<()>;
}

// --- File Implementation ---

/// Keeps all entries in one JSON object on disk.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn snapshot(&self) -> BookResult<HashMap<String, String>> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .map_err(|_| BookError::Storage("store lock poisoned".to_string()))
    }

    async fn flush(&self) -> BookResult<()> {
        let entries = self.snapshot()?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BookError::Storage(e.to_string()))?;
            }
        }
        let content = serde_json::to_string_pretty(&entries)
            .map_err(|e| BookError::Storage(e.to_string()))?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| BookError::Storage(format!("{}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn init(&self) -> BookResult<()> {
        let exists = tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| BookError::Storage(e.to_string()))?;
        if !exists {
            debug!("No store at {}, starting empty", self.path.display());
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| BookError::Storage(format!("{}: {}", self.path.display(), e)))?;
        let loaded: HashMap<String, String> = serde_json::from_str(&content)
            .map_err(|e| BookError::Storage(format!("{}: {}", self.path.display(), e)))?;

        let mut entries = self
            .entries
            .lock()
            .map_err(|_| BookError::Storage("store lock poisoned".to_string()))?;
        *entries = loaded;
        Ok(())
    }

    async fn get(&self, key: &str) -> BookResult<Option<String>> {
        Ok(self.snapshot()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> BookResult<()> {
        {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| BookError::Storage("store lock poisoned".to_string()))?;
            entries.insert(key.to_string(), value.to_string());
        }
        self.flush().await
    }

    async fn clear(&self, key: &str) -> BookResult<()> {
        let removed = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| BookError::Storage("store lock poisoned".to_string()))?;
            entries.remove(key).is_some()
        };
        if removed {
            self.flush().await?;
        }
        Ok(())
    }
}

// --- Memory Implementation ---

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn init(&self) -> BookResult<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> BookResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| BookError::Storage("store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> BookResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| BookError::Storage("store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn clear(&self, key: &str) -> BookResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| BookError::Storage("store lock poisoned".to_string()))?;
        entries.remove(key);
        Ok(())
    }
}
