//! Cross-device notification mirroring.
//!
//! Local state is authoritative; the replicated table is best effort. An
//! outbound mirror failure is logged and never rolls back the local
//! mutation. Inbound peer changes enter the registry through the same
//! serialized mutation path as local publishes, tagged with their origin
//! device.

pub mod store;

use crate::error::BrokerError;
use crate::limits::MIRROR_RETRY_ATTEMPTS;
use crate::registry::NotificationRegistry;
use crate::types::{
    ActiveNotification, DeleteReason, Importance, NotificationRequest, RemindType, ScreenState,
};
use herald_core::types::DeviceId;
use herald_core::CoreError;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use store::{DistributedKey, RemoteChange, ReplicatedStore};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const SCREEN_KEY_PREFIX: &str = "screen|";
const DEVICE_KEY_PREFIX: &str = "device|";
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Serialized form of a mirrored notification.
///
/// Carries the origin's resolved importance so the receiving device does not
/// need the publisher's slot configuration; the remind type is recomputed
/// per device from its own screen view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedEntry {
    pub request: NotificationRequest,
    pub importance: Importance,
    pub device_id: DeviceId,
}

/// Descriptor a device publishes about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct DeviceDescriptor {
    supports_display: bool,
}

pub struct DistributedSync {
    store: Arc<dyn ReplicatedStore>,
    local_device: DeviceId,
    supports_display: bool,
    local_screen: RwLock<ScreenState>,
}

impl DistributedSync {
    pub fn new(store: Arc<dyn ReplicatedStore>, local_device: DeviceId, supports_display: bool) -> Self {
        Self {
            store,
            local_device,
            supports_display,
            local_screen: RwLock::new(ScreenState::Unknown),
        }
    }

    pub fn local_device(&self) -> &DeviceId {
        &self.local_device
    }

    /// Publishes this device's descriptor so peers can see it.
    pub async fn register_local_device(&self) -> Result<(), BrokerError> {
        let descriptor = DeviceDescriptor {
            supports_display: self.supports_display,
        };
        let value = serde_json::to_string(&descriptor).map_err(|e| BrokerError::Persistence {
            operation: "register device".to_string(),
            message: e.to_string(),
            source: None,
        })?;
        let key = format!("{}{}", DEVICE_KEY_PREFIX, self.local_device);
        self.put_with_retry(&key, &value)
            .await
            .map_err(|e| BrokerError::persistence("register device", "Could not write descriptor", e))
    }

    pub fn local_screen(&self) -> ScreenState {
        *self
            .local_screen
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Records the local screen state and shares it with peers. The share is
    /// best effort; the local view updates either way.
    pub async fn set_local_screen(&self, on: bool) {
        let state = if on { ScreenState::On } else { ScreenState::Off };
        *self
            .local_screen
            .write()
            .unwrap_or_else(|e| e.into_inner()) = state;
        let key = format!("{}{}", SCREEN_KEY_PREFIX, self.local_device);
        let value = if on { "on" } else { "off" };
        if let Err(e) = self.put_with_retry(&key, value).await {
            warn!(error = %e, "Screen state could not be shared with peers.");
        }
    }

    /// Combined screen state of all peers: `On` when any peer screen is on,
    /// `Unknown` when no peer has published one.
    pub async fn remote_screen_state(&self) -> ScreenState {
        let entries = match self.store.entries().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Peer screen states unavailable.");
                return ScreenState::Unknown;
            }
        };
        let mut seen_any = false;
        for (key, value) in entries {
            let device = match key.strip_prefix(SCREEN_KEY_PREFIX) {
                Some(device) => device,
                None => continue,
            };
            if device == self.local_device.value() {
                continue;
            }
            seen_any = true;
            if value == "on" {
                return ScreenState::On;
            }
        }
        if seen_any {
            ScreenState::Off
        } else {
            ScreenState::Unknown
        }
    }

    /// Remind policy for a notification admitted on this device right now.
    pub async fn remind_type(&self) -> RemindType {
        RemindType::for_screens(self.local_screen(), self.remote_screen_state().await)
    }

    /// Whether a request should be mirrored: the publisher opted in and the
    /// bundle's distributed switch is on.
    pub fn should_mirror(&self, request: &NotificationRequest, bundle_enabled: bool) -> bool {
        request.flags.distributed && bundle_enabled
    }

    /// Writes the mirrored entry for a locally published notification.
    pub async fn mirror_outbound(&self, record: &ActiveNotification) -> Result<(), BrokerError> {
        let key = DistributedKey::new(
            self.local_device.clone(),
            record.bundle().bundle_name(),
            &record.request.label,
            record.request.id,
        );
        let entry = DistributedEntry {
            request: record.request.clone(),
            importance: record.importance,
            device_id: self.local_device.clone(),
        };
        let value = serde_json::to_string(&entry).map_err(|e| BrokerError::Persistence {
            operation: "mirror notification".to_string(),
            message: e.to_string(),
            source: None,
        })?;
        self.put_with_retry(&key.to_string(), &value)
            .await
            .map_err(|e| {
                BrokerError::persistence("mirror notification", "Could not write mirrored entry", e)
            })?;
        debug!(key = %key, "Notification mirrored.");
        Ok(())
    }

    /// Deletes the replicated entry for a notification that left the local
    /// registry. For remote-origin records this targets the origin device's
    /// key, so the table never keeps entries for notifications gone locally.
    pub async fn mirror_removal(&self, record: &ActiveNotification) -> Result<(), BrokerError> {
        let device = record
            .origin
            .device()
            .unwrap_or(&self.local_device)
            .clone();
        let key = DistributedKey::new(
            device,
            record.bundle().bundle_name(),
            &record.request.label,
            record.request.id,
        );
        self.delete_with_retry(&key.to_string())
            .await
            .map_err(|e| {
                BrokerError::persistence("unmirror notification", "Could not delete mirrored entry", e)
            })?;
        debug!(key = %key, "Mirrored entry deleted.");
        Ok(())
    }

    async fn put_with_retry(&self, key: &str, value: &str) -> Result<(), CoreError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.put(key, value).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < MIRROR_RETRY_ATTEMPTS => {
                    warn!(key, attempt, error = %e, "Replicated write failed, retrying.");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn delete_with_retry(&self, key: &str) -> Result<(), CoreError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.delete(key).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < MIRROR_RETRY_ATTEMPTS => {
                    warn!(key, attempt, error = %e, "Replicated delete failed, retrying.");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Starts the inbound loop translating peer changes into registry
    /// mutations. Runs until the store's change stream closes.
    pub fn run_inbound(self: Arc<Self>, registry: Arc<NotificationRegistry>) -> JoinHandle<()> {
        let mut changes = self.store.subscribe_changes();
        tokio::spawn(async move {
            info!(device = %self.local_device, "Inbound mirroring started.");
            loop {
                match changes.recv().await {
                    Ok(change) => self.apply_change(&registry, change).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Inbound mirror stream lagged.");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Inbound mirror stream closed.");
                        break;
                    }
                }
            }
        })
    }

    async fn apply_change(&self, registry: &NotificationRegistry, change: RemoteChange) {
        let key = match DistributedKey::parse(change.key()) {
            Some(key) => key,
            None => return,
        };
        if key.device_id == self.local_device {
            // Echo of our own outbound write.
            return;
        }
        match change {
            RemoteChange::Inserted { value, .. } | RemoteChange::Updated { value, .. } => {
                if !self.supports_display {
                    debug!(key = %key, "Ignoring mirrored notification, no display here.");
                    return;
                }
                let entry: DistributedEntry = match serde_json::from_str(&value) {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(key = %key, error = %e, "Mirrored entry is not decodable.");
                        return;
                    }
                };
                let remind = self.remind_type().await;
                match registry
                    .publish_remote(entry.request, key.device_id.clone(), remind, entry.importance)
                    .await
                {
                    Ok(local_key) => {
                        debug!(key = %key, local_key = %local_key, "Mirrored notification applied.")
                    }
                    Err(e) => warn!(key = %key, error = %e, "Mirrored notification rejected."),
                }
            }
            RemoteChange::Deleted { .. } => {
                let local_key = registry
                    .find_remote(&key.device_id, &key.bundle_name, &key.label, key.id)
                    .await;
                let Some(local_key) = local_key else {
                    debug!(key = %key, "Mirrored delete for an entry not present here.");
                    return;
                };
                match registry
                    .remove_by_key(&local_key, DeleteReason::Distributed, true)
                    .await
                {
                    Ok(_) => debug!(key = %key, "Mirrored delete applied."),
                    Err(BrokerError::NotificationNotExists { .. }) => {}
                    Err(e) => warn!(key = %key, error = %e, "Mirrored delete failed."),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::store::MemoryReplicatedStore;
    use super::*;
    use crate::dispatch::SubscriberDispatcher;
    use crate::flow_control::FlowController;
    use crate::identity::StaticIdentityResolver;
    use crate::preferences::{KeyValuePreferencesProvider, PreferencesStore, Slot};
    use crate::types::{NotificationFlags, NotificationOrigin, SlotType};
    use async_trait::async_trait;
    use chrono::Utc;
    use herald_core::storage::MemoryKeyValueStore;
    use herald_core::types::BundleIdentity;
    use mockall::mock;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn bundle() -> BundleIdentity {
        BundleIdentity::new("com.example.mail", 20010043, 100).unwrap()
    }

    fn request(id: i32, distributed: bool) -> NotificationRequest {
        NotificationRequest {
            bundle: bundle(),
            id,
            label: "inbox".to_string(),
            slot_type: SlotType::ServiceReminder,
            content: Default::default(),
            flags: NotificationFlags {
                distributed,
                ..Default::default()
            },
            badge_number: None,
            sort_key: None,
            delivery_time: None,
        }
    }

    fn record(id: i32, origin: NotificationOrigin) -> ActiveNotification {
        ActiveNotification::new(
            request(id, true),
            origin,
            RemindType::None,
            Importance::Normal,
            Utc::now(),
        )
    }

    fn sync_over(store: Arc<MemoryReplicatedStore>) -> DistributedSync {
        DistributedSync::new(store, DeviceId::new("local-device").unwrap(), true)
    }

    async fn registry() -> Arc<NotificationRegistry> {
        let preferences = Arc::new(
            PreferencesStore::load(
                Arc::new(KeyValuePreferencesProvider::new(Arc::new(
                    MemoryKeyValueStore::new(),
                ))),
                Arc::new(StaticIdentityResolver::new(true)),
            )
            .await
            .unwrap(),
        );
        preferences
            .add_slot(&bundle(), Slot::new(SlotType::ServiceReminder))
            .await
            .unwrap();
        Arc::new(NotificationRegistry::new(
            preferences,
            Arc::new(FlowController::new()),
            Arc::new(SubscriberDispatcher::new()),
        ))
    }

    async fn wait_for_count(registry: &NotificationRegistry, expected: usize) {
        for _ in 0..200 {
            if registry.total_count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("Registry never reached {} active entries.", expected);
    }

    #[test]
    fn mirroring_requires_both_switches() {
        let sync = sync_over(Arc::new(MemoryReplicatedStore::new()));
        assert!(sync.should_mirror(&request(1, true), true));
        assert!(!sync.should_mirror(&request(1, false), true));
        assert!(!sync.should_mirror(&request(1, true), false));
    }

    #[tokio::test]
    async fn outbound_mirror_writes_the_composite_key() {
        let store = Arc::new(MemoryReplicatedStore::new());
        let sync = sync_over(Arc::clone(&store));
        sync.mirror_outbound(&record(42, NotificationOrigin::Local))
            .await
            .unwrap();

        let raw = store
            .get("local-device|com.example.mail|inbox|42")
            .await
            .unwrap()
            .unwrap();
        let entry: DistributedEntry = serde_json::from_str(&raw).unwrap();
        assert_eq!(entry.request.id, 42);
        assert_eq!(entry.device_id.value(), "local-device");
    }

    #[tokio::test]
    async fn removal_of_a_mirrored_remote_targets_the_origin_key() {
        let store = Arc::new(MemoryReplicatedStore::new());
        let origin = DeviceId::new("phone-b").unwrap();
        store
            .put("phone-b|com.example.mail|inbox|42", "{}")
            .await
            .unwrap();

        let sync = sync_over(Arc::clone(&store));
        sync.mirror_removal(&record(42, NotificationOrigin::Remote(origin)))
            .await
            .unwrap();
        assert_eq!(
            store.get("phone-b|com.example.mail|inbox|42").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn screen_states_aggregate_across_peers() {
        let store = Arc::new(MemoryReplicatedStore::new());
        let sync = sync_over(Arc::clone(&store));

        // Nobody has published yet.
        assert_eq!(sync.remote_screen_state().await, ScreenState::Unknown);
        assert_eq!(sync.remind_type().await, RemindType::DeviceActiveRemind);

        store.put("screen|phone-b", "off").await.unwrap();
        assert_eq!(sync.remote_screen_state().await, ScreenState::Off);
        assert_eq!(sync.remind_type().await, RemindType::DeviceIdleRemind);

        store.put("screen|phone-c", "on").await.unwrap();
        assert_eq!(sync.remote_screen_state().await, ScreenState::On);

        sync.set_local_screen(false).await;
        assert_eq!(sync.remind_type().await, RemindType::DeviceIdleDoNotRemind);

        // Our own published screen entry does not count as a peer.
        assert_eq!(
            store.get("screen|local-device").await.unwrap().as_deref(),
            Some("off")
        );
    }

    #[tokio::test]
    async fn inbound_insert_lands_in_the_registry() {
        let store = Arc::new(MemoryReplicatedStore::new());
        let sync = Arc::new(sync_over(Arc::clone(&store)));
        let registry = registry().await;
        let _inbound = Arc::clone(&sync).run_inbound(Arc::clone(&registry));
        tokio::task::yield_now().await;

        let entry = DistributedEntry {
            request: request(7, true),
            importance: Importance::High,
            device_id: DeviceId::new("phone-b").unwrap(),
        };
        store
            .apply_remote(RemoteChange::Inserted {
                key: "phone-b|com.example.mail|inbox|7".to_string(),
                value: serde_json::to_string(&entry).unwrap(),
            })
            .await;

        wait_for_count(&registry, 1).await;

        let device = DeviceId::new("phone-b").unwrap();
        let key = registry
            .find_remote(&device, "com.example.mail", "inbox", 7)
            .await
            .unwrap();
        let record = registry.get(&key).await.unwrap();
        assert_eq!(record.origin, NotificationOrigin::Remote(device));
        assert_eq!(record.importance, Importance::High);
    }

    #[tokio::test]
    async fn inbound_delete_removes_the_mirrored_record() {
        let store = Arc::new(MemoryReplicatedStore::new());
        let sync = Arc::new(sync_over(Arc::clone(&store)));
        let registry = registry().await;
        let device = DeviceId::new("phone-b").unwrap();
        registry
            .publish_remote(
                request(7, true),
                device.clone(),
                RemindType::DeviceActiveRemind,
                Importance::Normal,
            )
            .await
            .unwrap();
        let _inbound = Arc::clone(&sync).run_inbound(Arc::clone(&registry));
        tokio::task::yield_now().await;

        store
            .apply_remote(RemoteChange::Deleted {
                key: "phone-b|com.example.mail|inbox|7".to_string(),
            })
            .await;

        wait_for_count(&registry, 0).await;
    }

    #[tokio::test]
    async fn own_echoes_and_foreign_noise_are_skipped() {
        let store = Arc::new(MemoryReplicatedStore::new());
        let sync = Arc::new(sync_over(Arc::clone(&store)));
        let registry = registry().await;
        let _inbound = Arc::clone(&sync).run_inbound(Arc::clone(&registry));
        tokio::task::yield_now().await;

        let own = DistributedEntry {
            request: request(1, true),
            importance: Importance::Normal,
            device_id: DeviceId::new("local-device").unwrap(),
        };
        store
            .apply_remote(RemoteChange::Inserted {
                key: "local-device|com.example.mail|inbox|1".to_string(),
                value: serde_json::to_string(&own).unwrap(),
            })
            .await;
        store
            .apply_remote(RemoteChange::Inserted {
                key: "screen|phone-b".to_string(),
                value: "on".to_string(),
            })
            .await;
        store
            .apply_remote(RemoteChange::Inserted {
                key: "phone-b|com.example.mail|inbox|2".to_string(),
                value: "not json".to_string(),
            })
            .await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(registry.total_count().await, 0);
    }

    mock! {
        Replicated {}

        #[async_trait]
        impl ReplicatedStore for Replicated {
            async fn put(&self, key: &str, value: &str) -> Result<(), CoreError>;
            async fn delete(&self, key: &str) -> Result<(), CoreError>;
            async fn get(&self, key: &str) -> Result<Option<String>, CoreError>;
            async fn entries(&self) -> Result<Vec<(String, String)>, CoreError>;
            fn subscribe_changes(&self) -> broadcast::Receiver<RemoteChange>;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_retries_are_bounded() {
        let mut store = MockReplicated::new();
        store
            .expect_put()
            .times(MIRROR_RETRY_ATTEMPTS)
            .returning(|_, _| Err(CoreError::Internal("replication down".to_string())));
        let sync = DistributedSync::new(
            Arc::new(store),
            DeviceId::new("local-device").unwrap(),
            true,
        );
        let err = sync
            .mirror_outbound(&record(1, NotificationOrigin::Local))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Persistence);
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_succeeds_after_a_transient_failure() {
        let mut store = MockReplicated::new();
        let mut calls = 0;
        store.expect_put().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(CoreError::Internal("transient".to_string()))
            } else {
                Ok(())
            }
        });
        let sync = DistributedSync::new(
            Arc::new(store),
            DeviceId::new("local-device").unwrap(),
            true,
        );
        sync.mirror_outbound(&record(1, NotificationOrigin::Local))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn display_less_devices_ignore_inbound_notifications() {
        let store = Arc::new(MemoryReplicatedStore::new());
        let sync = Arc::new(DistributedSync::new(
            Arc::clone(&store) as Arc<dyn ReplicatedStore>,
            DeviceId::new("local-device").unwrap(),
            false,
        ));
        let registry = registry().await;
        let _inbound = Arc::clone(&sync).run_inbound(Arc::clone(&registry));
        tokio::task::yield_now().await;

        let entry = DistributedEntry {
            request: request(7, true),
            importance: Importance::Normal,
            device_id: DeviceId::new("phone-b").unwrap(),
        };
        store
            .apply_remote(RemoteChange::Inserted {
                key: "phone-b|com.example.mail|inbox|7".to_string(),
                value: serde_json::to_string(&entry).unwrap(),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(registry.total_count().await, 0);
    }
}
