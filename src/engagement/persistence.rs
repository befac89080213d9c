use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{FeedError, Result};

pub const LIKED_REELS_KEY: &str = "liked_reels";
pub const SAVED_REELS_KEY: &str = "saved_reels";

/// Local string key-value storage. Values may be corrupted by other writers;
/// callers must tolerate anything they read.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String) -> Result<()>;
}

/// In-process store for tests and the demo binary.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a raw value, bypassing serialization.
    pub fn with_value(self, key: &str, value: &str) -> Self {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
        self
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| FeedError::Persistence("memory store poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| FeedError::Persistence("memory store poisoned".to_string()))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// All keys in one JSON object on disk.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Store next to the config file.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reel-feed")
            .join("engagement.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(values) => Ok(values),
            Err(e) => {
                log::warn!("Store file {} is corrupted, starting empty: {}", self.path.display(), e);
                Ok(BTreeMap::new())
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.read_all().await?;
        values.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&values)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

/// Reads a persisted id set. A corrupted value is logged, overwritten with an
/// empty set and treated as empty.
pub async fn read_id_set(store: &dyn KeyValueStore, key: &str) -> Result<BTreeSet<String>> {
    let Some(raw) = store.get(key).await? else {
        return Ok(BTreeSet::new());
    };

    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(ids) => Ok(ids.into_iter().collect()),
        Err(e) => {
            log::warn!("Persisted value for {} is corrupted, resetting: {}", key, e);
            write_id_set(store, key, &BTreeSet::new()).await?;
            Ok(BTreeSet::new())
        }
    }
}

pub async fn write_id_set(store: &dyn KeyValueStore, key: &str, ids: &BTreeSet<String>) -> Result<()> {
    let ids: Vec<&String> = ids.iter().collect();
    store.set(key, serde_json::to_string(&ids)?).await
}
