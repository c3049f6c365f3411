//! In-memory store.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value as JsonValue;

use super::{KeyValueStore, StorageResult};

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, JsonValue>,
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

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StorageResult<Option<JsonValue>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: JsonValue) -> StorageResult<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}
