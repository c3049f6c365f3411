//! JSON file store.
//!
//! The whole map is one JSON object on disk. Every mutation rewrites it via
//! write-to-temp-then-rename so a crash mid-write never leaves a torn file.
//! Mutations are serialized by an async mutex that also guards the
//! in-memory copy, which only changes once the file write has succeeded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::{KeyValueStore, StorageResult};

pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, JsonValue>>,
}

impl JsonFileStore {
    /// Open the store at `path`, creating an empty one if the file is absent.
    pub async fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), keys = entries.len(), "Opened JSON file store");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &BTreeMap<String, JsonValue>) -> StorageResult<()> {
        let content = serde_json::to_vec_pretty(entries)?;
        atomic_write(&self.path, &content).await
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> StorageResult<Option<JsonValue>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: JsonValue) -> StorageResult<()> {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        next.insert(key.to_string(), value);

        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);

        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }
}

async fn atomic_write(path: &Path, content: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let tmp_path = path.with_extension("json.tmp");

    tokio::fs::write(&tmp_path, content).await.map_err(|e| {
        error!(
            event = "store_write_failure",
            path = %tmp_path.display(),
            error = %e,
            "Failed to write temp file"
        );
        e
    })?;

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        error!(
            event = "store_rename_failure",
            from = %tmp_path.display(),
            to = %path.display(),
            error = %e,
            "Failed to rename temp file"
        );
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }

    Ok(())
}
