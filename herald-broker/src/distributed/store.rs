//! Replicated store abstraction for cross-device mirroring.
//!
//! The broker treats the replicated table as a key-value store that reports
//! changes made by peers. Keys are flat strings; notification entries use
//! the `device|bundle|label|id` composite, screen and device records use
//! their own prefixes.

use async_trait::async_trait;
use herald_core::types::DeviceId;
use herald_core::CoreError;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::{broadcast, RwLock};

/// Composite key of one mirrored notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedKey {
    pub device_id: DeviceId,
    pub bundle_name: String,
    pub label: String,
    pub id: i32,
}

impl DistributedKey {
    pub fn new(device_id: DeviceId, bundle_name: &str, label: &str, id: i32) -> Self {
        Self {
            device_id,
            bundle_name: bundle_name.to_string(),
            label: label.to_string(),
            id,
        }
    }

    /// Parses a store key. Returns `None` for malformed keys and for the
    /// screen/device bookkeeping entries.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.starts_with("screen|") || raw.starts_with("device|") {
            return None;
        }
        let mut parts = raw.splitn(3, '|');
        let device = parts.next()?;
        let bundle_name = parts.next()?;
        let rest = parts.next()?;
        // The label may contain the delimiter; the id never does.
        let (label, id) = rest.rsplit_once('|')?;
        let id = id.parse().ok()?;
        let device_id = DeviceId::new(device).ok()?;
        Some(Self {
            device_id,
            bundle_name: bundle_name.to_string(),
            label: label.to_string(),
            id,
        })
    }
}

impl fmt::Display for DistributedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.device_id, self.bundle_name, self.label, self.id
        )
    }
}

/// A change applied to the replicated table by a peer device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteChange {
    Inserted { key: String, value: String },
    Updated { key: String, value: String },
    Deleted { key: String },
}

impl RemoteChange {
    pub fn key(&self) -> &str {
        match self {
            RemoteChange::Inserted { key, .. }
            | RemoteChange::Updated { key, .. }
            | RemoteChange::Deleted { key } => key,
        }
    }
}

/// The replicated, cross-device table.
///
/// `put`/`delete` act on behalf of this device and are not echoed back
/// through `subscribe_changes`; the change stream carries peer writes only.
#[async_trait]
pub trait ReplicatedStore: Send + Sync {
    async fn put(&self, key: &str, value: &str) -> Result<(), CoreError>;
    async fn delete(&self, key: &str) -> Result<(), CoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError>;
    async fn entries(&self) -> Result<Vec<(String, String)>, CoreError>;
    fn subscribe_changes(&self) -> broadcast::Receiver<RemoteChange>;
}

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// In-process stand-in for the replicated table.
///
/// Local writes mutate the map silently; [`MemoryReplicatedStore::apply_remote`]
/// plays the role of a peer device, mutating the map and emitting the change.
pub struct MemoryReplicatedStore {
    entries: RwLock<HashMap<String, String>>,
    changes: broadcast::Sender<RemoteChange>,
}

impl Default for MemoryReplicatedStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            changes,
        }
    }
}

impl MemoryReplicatedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a peer's change: the table mutates and subscribers hear about
    /// it, exactly as a replication layer would deliver it.
    pub async fn apply_remote(&self, change: RemoteChange) {
        {
            let mut entries = self.entries.write().await;
            match &change {
                RemoteChange::Inserted { key, value } | RemoteChange::Updated { key, value } => {
                    entries.insert(key.clone(), value.clone());
                }
                RemoteChange::Deleted { key } => {
                    entries.remove(key);
                }
            }
        }
        // No receivers is fine; the broker may not have started inbound yet.
        let _ = self.changes.send(change);
    }
}

#[async_trait]
impl ReplicatedStore for MemoryReplicatedStore {
    async fn put(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn entries(&self) -> Result<Vec<(String, String)>, CoreError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<RemoteChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn key_round_trips_through_display() {
        let key = DistributedKey::new(
            DeviceId::new("phone-a").unwrap(),
            "com.example.mail",
            "inbox",
            42,
        );
        let raw = key.to_string();
        assert_eq!(raw, "phone-a|com.example.mail|inbox|42");
        assert_eq!(DistributedKey::parse(&raw), Some(key));
    }

    #[test]
    fn key_parse_keeps_delimiters_inside_labels() {
        let parsed = DistributedKey::parse("phone-a|com.example.mail|a|b|c|7").unwrap();
        assert_eq!(parsed.label, "a|b|c");
        assert_eq!(parsed.id, 7);
    }

    #[test]
    fn key_parse_rejects_bookkeeping_and_malformed_entries() {
        assert_eq!(DistributedKey::parse("screen|phone-a"), None);
        assert_eq!(DistributedKey::parse("device|phone-a"), None);
        assert_eq!(DistributedKey::parse("phone-a|only-two"), None);
        assert_eq!(
            DistributedKey::parse("phone-a|com.example.mail|inbox|not-a-number"),
            None
        );
    }

    #[test]
    fn empty_label_round_trips() {
        let key = DistributedKey::new(
            DeviceId::new("phone-a").unwrap(),
            "com.example.mail",
            "",
            0,
        );
        assert_eq!(DistributedKey::parse(&key.to_string()), Some(key));
    }

    #[tokio::test]
    async fn local_writes_are_not_echoed() {
        let store = MemoryReplicatedStore::new();
        let mut rx = store.subscribe_changes();
        store.put("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn remote_changes_mutate_and_broadcast() {
        let store = MemoryReplicatedStore::new();
        let mut rx = store.subscribe_changes();
        let change = RemoteChange::Inserted {
            key: "k".to_string(),
            value: "v".to_string(),
        };
        store.apply_remote(change.clone()).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(rx.recv().await.unwrap(), change);

        store
            .apply_remote(RemoteChange::Deleted {
                key: "k".to_string(),
            })
            .await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.entries().await.unwrap().len(), 0);
    }
}
