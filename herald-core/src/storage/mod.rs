//! Key-value storage abstraction for durable broker state.
//!
//! Higher layers persist their records through the [`KeyValueStore`] trait so
//! the storage backend can be swapped in tests. Two implementations are
//! provided: [`FileKeyValueStore`], which keeps one file per key under a data
//! directory, and [`MemoryKeyValueStore`], an in-process map for tests and
//! ephemeral setups.

use crate::error::CoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Abstract, string-keyed durable store.
///
/// Implementations must make `put` durable before returning: once `put`
/// resolves, a crash must not lose the value.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, or `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError>;

    /// Durably stores `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: &str) -> Result<(), CoreError>;

    /// Removes the value stored under `key`. Removing an absent key is a
    /// no-op.
    async fn remove(&self, key: &str) -> Result<(), CoreError>;

    /// Lists all keys currently present in the store.
    async fn keys(&self) -> Result<Vec<String>, CoreError>;
}

/// Extension of the record filenames written by [`FileKeyValueStore`].
const RECORD_EXTENSION: &str = ".kv";

/// Encodes a store key into a filesystem-safe file stem.
///
/// ASCII alphanumerics, `.`, `_` and `-` pass through; every other byte is
/// percent-encoded. The encoding is reversible via [`decode_key`].
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                encoded.push(byte as char)
            }
            other => {
                encoded.push('%');
                encoded.push_str(&format!("{:02X}", other));
            }
        }
    }
    encoded
}

/// Decodes a file stem produced by [`encode_key`] back into the store key.
///
/// Returns `None` for names that are not valid encodings.
fn decode_key(encoded: &str) -> Option<String> {
    let raw = encoded.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let hex = raw.get(i + 1..i + 3)?;
            let hex_str = std::str::from_utf8(hex).ok()?;
            bytes.push(u8::from_str_radix(hex_str, 16).ok()?);
            i += 3;
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }
    String::from_utf8(bytes).ok()
}

fn filesystem_error(message: impl Into<String>, path: &Path, source: std::io::Error) -> CoreError {
    CoreError::Filesystem {
        message: message.into(),
        path: path.to_path_buf(),
        source,
    }
}

/// File-backed [`KeyValueStore`] keeping one record file per key.
///
/// Record files are named after the percent-encoded key with a `.kv`
/// extension. Writes go to a temporary sibling first and are renamed into
/// place so readers never observe a partial record.
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    /// Creates a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let dir = dir.into();
        crate::utils::fs::ensure_dir_exists(&dir)?;
        Ok(Self { dir })
    }

    /// Returns the directory the store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}", encode_key(key), RECORD_EXTENSION))
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let path = self.record_path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(filesystem_error(
                format!("Failed to read record for key '{}'", key),
                &path,
                e,
            )),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CoreError> {
        let path = self.record_path(key);
        let tmp_path = path.with_extension("kv.tmp");

        tokio::fs::write(&tmp_path, value).await.map_err(|e| {
            filesystem_error(
                format!("Failed to write record for key '{}'", key),
                &tmp_path,
                e,
            )
        })?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| {
            filesystem_error(
                format!("Failed to commit record for key '{}'", key),
                &path,
                e,
            )
        })?;
        debug!("Stored record for key '{}' at {:?}", key, path);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CoreError> {
        let path = self.record_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed record for key '{}'", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(filesystem_error(
                format!("Failed to remove record for key '{}'", key),
                &path,
                e,
            )),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, CoreError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            filesystem_error("Failed to list store directory", &self.dir, e)
        })?;

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            filesystem_error("Failed to iterate store directory", &self.dir, e)
        })? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(stem) = name.strip_suffix(RECORD_EXTENSION) else {
                continue;
            };
            match decode_key(stem) {
                Some(key) => keys.push(key),
                None => {
                    warn!("Skipping store file with undecodable name: {}", name);
                }
            }
        }
        Ok(keys)
    }
}

/// In-memory [`KeyValueStore`] used in tests and ephemeral configurations.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, CoreError> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn encode_key_passes_safe_characters_through() {
        assert_eq!(encode_key("com.example.mail_20010043"), "com.example.mail_20010043");
    }

    #[test]
    fn encode_key_escapes_unsafe_characters() {
        let encoded = encode_key("a/b|c d");
        assert_eq!(encoded, "a%2Fb%7Cc%20d");
        assert_eq!(decode_key(&encoded), Some("a/b|c d".to_string()));
    }

    #[test]
    fn decode_key_rejects_truncated_escapes() {
        assert_eq!(decode_key("abc%2"), None);
        assert_eq!(decode_key("abc%zz"), None);
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryKeyValueStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.put("alpha", "one").await.unwrap();
        store.put("beta", "two").await.unwrap();
        assert_eq!(store.get("alpha").await.unwrap(), Some("one".to_string()));

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["alpha".to_string(), "beta".to_string()]);

        store.remove("alpha").await.unwrap();
        assert_eq!(store.get("alpha").await.unwrap(), None);
        // Removing again is a no-op.
        store.remove("alpha").await.unwrap();
    }

    #[tokio::test]
    async fn file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(dir.path()).unwrap();

        assert_eq!(store.get("com.example.mail_1").await.unwrap(), None);

        store.put("com.example.mail_1", "record-a").await.unwrap();
        store.put("com.example/chat_2", "record-b").await.unwrap();

        assert_eq!(
            store.get("com.example.mail_1").await.unwrap(),
            Some("record-a".to_string())
        );
        assert_eq!(
            store.get("com.example/chat_2").await.unwrap(),
            Some("record-b".to_string())
        );

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(
            keys,
            vec!["com.example.mail_1".to_string(), "com.example/chat_2".to_string()]
        );
    }

    #[tokio::test]
    async fn file_store_put_replaces_existing_value() {
        let dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(dir.path()).unwrap();

        store.put("key", "first").await.unwrap();
        store.put("key", "second").await.unwrap();
        assert_eq!(store.get("key").await.unwrap(), Some("second".to_string()));
        assert_eq!(store.keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn file_store_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(dir.path()).unwrap();

        store.put("key", "value").await.unwrap();
        store.remove("key").await.unwrap();
        assert_eq!(store.get("key").await.unwrap(), None);
        store.remove("key").await.unwrap();
    }

    #[tokio::test]
    async fn file_store_keys_skips_foreign_files() {
        let dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(dir.path()).unwrap();

        store.put("real-key", "value").await.unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "not a record")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("broken%zz.kv"), "bad name")
            .await
            .unwrap();

        let keys = store.keys().await.unwrap();
        assert_eq!(keys, vec!["real-key".to_string()]);
    }
}
