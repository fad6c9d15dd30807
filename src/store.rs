//! Durable key/value stores backing the editor.
//!
//! The dataset snapshot is large and goes into a [`BlobStore`]; the addition,
//! deletion and edit logs are small and go into a [`LocalStore`]. Both sit
//! behind [`KeyValueStore`] so the view engine never knows which it has.

use async_trait::async_trait;
use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File, create_dir_all};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{StoreError, StoreResult};

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    async fn put(&self, key: &str, value: &Value) -> StoreResult<()>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Called once when the session shuts down.
    async fn flush(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Volatile store, mostly for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &Value) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct BlobEnvelope {
    key: String,
    saved_at: i64,
    json: String,
}

/// Large-object store: one gzip-compressed file per key.
///
/// The value is written as JSON text inside a bincode envelope that also
/// records the original key, so two keys that sanitize to the same file name
/// never read each other's data.
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    /// Opens (and creates if needed) the store directory.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            create_dir_all(&dir)?;
        }
        Ok(BlobStore { dir })
    }

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
        self.dir.join(format!("{}.bin.gz", name))
    }
}

fn write_blob(path: &Path, envelope: &BlobEnvelope) -> StoreResult<()> {
    let tmp = path.with_extension("tmp");
    let file = File::create(&tmp)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serialize_into(&mut encoder, envelope)?;
    encoder.finish()?.flush()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_blob(path: &Path) -> StoreResult<Option<BlobEnvelope>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut reader = BufReader::new(GzDecoder::new(file));
    let envelope: BlobEnvelope = deserialize_from(&mut reader)?;
    Ok(Some(envelope))
}

#[async_trait]
impl KeyValueStore for BlobStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let path = self.path_for(key);
        let envelope = tokio::task::spawn_blocking(move || read_blob(&path)).await??;

        match envelope {
            Some(env) if env.key == key => Ok(Some(serde_json::from_str(&env.json)?)),
            Some(env) => {
                debug!("blob for '{}' belongs to '{}', treating as miss", key, env.key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &Value) -> StoreResult<()> {
        let path = self.path_for(key);
        let envelope = BlobEnvelope {
            key: key.to_string(),
            saved_at: chrono::Utc::now().timestamp_millis(),
            json: serde_json::to_string(value)?,
        };
        tokio::task::spawn_blocking(move || write_blob(&path, &envelope)).await?
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Small, size-bounded store kept in a single JSON document.
///
/// Reads are served from memory; every write rewrites the document. The quota
/// counts the serialized size of all values together.
pub struct LocalStore {
    path: PathBuf,
    limit_bytes: usize,
    entries: RwLock<HashMap<String, Value>>,
}

impl LocalStore {
    pub fn open(path: impl AsRef<Path>, limit_bytes: usize) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                create_dir_all(parent)?;
            }
        }

        let entries = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("discarding unreadable local store {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(LocalStore {
            path,
            limit_bytes,
            entries: RwLock::new(entries),
        })
    }

    fn save(&self, entries: &HashMap<String, Value>) -> StoreResult<()> {
        let json = serde_json::to_string(entries)?;
        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn used_bytes(entries: &HashMap<String, Value>, skip: &str) -> usize {
        entries
            .iter()
            .filter(|(k, _)| k.as_str() != skip)
            .map(|(k, v)| k.len() + v.to_string().len())
            .sum()
    }
}

#[async_trait]
impl KeyValueStore for LocalStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &Value) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        let size = key.len() + value.to_string().len();
        if Self::used_bytes(&entries, key) + size > self.limit_bytes {
            return Err(StoreError::QuotaExceeded {
                key: key.to_string(),
                size,
                limit: self.limit_bytes,
            });
        }
        entries.insert(key.to_string(), value.clone());
        self.save(&entries)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }

    async fn flush(&self) -> StoreResult<()> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        self.save(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn blob_store_round_trips_large_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path().join("blobs")).unwrap();
        let rows: Vec<Value> = (0..2000)
            .map(|i| json!({"_internalId": format!("row-{}", i), "name": "x".repeat(40)}))
            .collect();
        let value = Value::Array(rows);

        assert_eq!(store.get("table-dataset").await.unwrap(), None);
        store.put("table-dataset", &value).await.unwrap();
        assert_eq!(store.get("table-dataset").await.unwrap(), Some(value));

        store.delete("table-dataset").await.unwrap();
        assert_eq!(store.get("table-dataset").await.unwrap(), None);
        store.delete("table-dataset").await.unwrap();
    }

    #[tokio::test]
    async fn blob_store_keeps_sanitized_keys_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        store.put("a b", &json!(1)).await.unwrap();
        assert_eq!(store.get("a_b").await.unwrap(), None);
        assert_eq!(store.get("a b").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn local_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        {
            let store = LocalStore::open(&path, 1024).unwrap();
            store.put("table-editor-deleted-rows", &json!(["row-1"])).await.unwrap();
        }
        let store = LocalStore::open(&path, 1024).unwrap();
        assert_eq!(
            store.get("table-editor-deleted-rows").await.unwrap(),
            Some(json!(["row-1"]))
        );
    }

    #[tokio::test]
    async fn local_store_replaces_document_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        // Leftover from an interrupted write; the real document is untouched.
        fs::write(dir.path().join("local.tmp"), "{\"partial").unwrap();

        let store = LocalStore::open(&path, 1024).unwrap();
        store.put("table-editor-edits", &json!({"row-0": {"name": "X"}})).await.unwrap();
        store.put("table-editor-added-rows", &json!([])).await.unwrap();

        assert!(!dir.path().join("local.tmp").exists());
        let reopened = LocalStore::open(&path, 1024).unwrap();
        assert_eq!(
            reopened.get("table-editor-edits").await.unwrap(),
            Some(json!({"row-0": {"name": "X"}}))
        );
        assert_eq!(reopened.get("table-editor-added-rows").await.unwrap(), Some(json!([])));
    }

    #[tokio::test]
    async fn local_store_enforces_quota() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("local.json"), 64).unwrap();
        store.put("small", &json!("ok")).await.unwrap();

        let err = store.put("big", &json!("x".repeat(100))).await.unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { .. }));
        assert_eq!(store.get("big").await.unwrap(), None);

        // Replacing a value only counts the new size.
        store.put("small", &json!("still ok")).await.unwrap();
    }

    #[tokio::test]
    async fn memory_store_basics() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.put("k", &json!({"a": 1})).await.unwrap();
        assert_eq!(store.len(), 1);
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
