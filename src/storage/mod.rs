//! Persistent key-value storage.
//!
//! The core only ever talks to [`KeyValueStore`]: opaque string keys mapped
//! to JSON values. Two backends ship with the crate:
//!
//! - [`MemoryStore`]: in-process, used by tests and ephemeral runs
//! - [`JsonFileStore`]: a single JSON document on disk, written atomically

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Storage key for the device key encrypted under the session key
pub const KEY_DEVICE_KEY: &str = "deviceKey";

/// Storage key for the master secret encrypted under the device key
pub const KEY_MASTER_SECRET: &str = "masterSecret";

/// Storage key for the `initialized` flag
pub const KEY_INITIALIZED: &str = "initialized";

/// Storage key for the identity creation timestamp (Unix ms)
pub const KEY_CREATED_AT: &str = "createdAt";

/// Storage key for the consumed-nonce map
pub const KEY_USED_NONCES: &str = "usedNonces";

/// Every key the core writes; `reset` removes all of them.
pub const ALL_KEYS: [&str; 5] = [
    KEY_DEVICE_KEY,
    KEY_MASTER_SECRET,
    KEY_INITIALIZED,
    KEY_CREATED_AT,
    KEY_USED_NONCES,
];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Async key-value store over JSON values
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<JsonValue>>;

    async fn set(&self, key: &str, value: JsonValue) -> StorageResult<()>;

    async fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Read and deserialize a typed value.
pub async fn load<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> StorageResult<Option<T>> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize and write a typed value.
pub async fn save<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    store.set(key, serde_json::to_value(value)?).await
}
