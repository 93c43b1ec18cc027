//! Whole-record key-value persistence.
//!
//! The plugin only ever reads or replaces complete records, so the store is
//! a plain map from key to JSON value.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::StoreError;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns `Ok(None)` when the record has never been written.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

pub type SharedStore = Arc<dyn KvStore>;

/// Reads and decodes a record, falling back to `T::default()` when it is
/// missing or unreadable.
pub async fn load_or_default<T>(store: &dyn KvStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match store.get(key).await {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(record) => record,
            Err(e) => {
                warn!(key, error = %e, "persisted record is malformed, starting empty");
                T::default()
            }
        },
        Ok(None) => T::default(),
        Err(e) => {
            warn!(key, error = %e, "failed to read persisted record, starting empty");
            T::default()
        }
    }
}

pub async fn save<T: Serialize>(store: &dyn KvStore, key: &str, record: &T) -> Result<(), StoreError> {
    store.set(key, serde_json::to_value(record)?).await
}

/// One pretty-printed JSON file per key inside a directory.
///
/// Writes go to `<key>.json.tmp` and are renamed into place, so a reader
/// never sees a half-written record.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl KvStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match tokio::fs::read_to_string(self.path(key)).await {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let target = self.path(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        let data = serde_json::to_string_pretty(&value)?;

        tokio::fs::write(&tmp, data.as_bytes()).await?;
        tokio::fs::rename(&tmp, &target).await?;

        debug!(path = %target.display(), "record written");
        Ok(())
    }
}

/// Volatile store, used by tests and by hosts that do not want files.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.records.write().await.insert(key.to_string(), value);
        Ok(())
    }
}
