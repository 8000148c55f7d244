//! The authoritative table of active notifications.
//!
//! Every mutation passes through one write section that validates, mutates,
//! recomputes the sorting snapshot, and enqueues the subscriber events as a
//! unit. No other mutation interleaves, so every snapshot a subscriber sees
//! corresponds to exactly one mutation. Queries take the read side and are
//! linearizable against completed mutations.

use crate::dispatch::SubscriberDispatcher;
use crate::error::BrokerError;
use crate::events::SubscriberEvent;
use crate::flow_control::FlowController;
use crate::limits::{
    DEFAULT_RECENT_CAPACITY, MAX_ACTIVE_PER_BUNDLE, MAX_ACTIVE_TOTAL, MAX_ICON_BYTES,
    MAX_PICTURE_BYTES,
};
use crate::preferences::PreferencesStore;
use crate::sorting::{self, SortingEngine, SortingSnapshot};
use crate::types::{
    ActiveNotification, DeleteReason, Importance, NotificationKey, NotificationOrigin,
    NotificationRequest, RemindType,
};
use chrono::Utc;
use herald_core::types::{BundleIdentity, DeviceId};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};

struct RegistryState {
    active: HashMap<NotificationKey, ActiveNotification>,
    per_bundle: HashMap<String, usize>,
    recent: VecDeque<ActiveNotification>,
    recent_capacity: usize,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            active: HashMap::new(),
            per_bundle: HashMap::new(),
            recent: VecDeque::new(),
            recent_capacity: DEFAULT_RECENT_CAPACITY,
        }
    }

    fn bundle_count(&self, bundle: &BundleIdentity) -> usize {
        self.per_bundle
            .get(&bundle.storage_key())
            .copied()
            .unwrap_or(0)
    }

    fn count_insert(&mut self, bundle: &BundleIdentity) {
        *self.per_bundle.entry(bundle.storage_key()).or_insert(0) += 1;
    }

    fn count_remove(&mut self, bundle: &BundleIdentity) {
        let key = bundle.storage_key();
        if let Some(count) = self.per_bundle.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.per_bundle.remove(&key);
            }
        }
    }

    /// Archives a record that just left the table, newest first.
    fn push_recent(&mut self, record: ActiveNotification) {
        self.recent.push_front(record);
        self.recent.truncate(self.recent_capacity);
    }
}

pub struct NotificationRegistry {
    state: RwLock<RegistryState>,
    preferences: Arc<PreferencesStore>,
    flow: Arc<FlowController>,
    sorting: SortingEngine,
    dispatcher: Arc<SubscriberDispatcher>,
}

impl NotificationRegistry {
    pub fn new(
        preferences: Arc<PreferencesStore>,
        flow: Arc<FlowController>,
        dispatcher: Arc<SubscriberDispatcher>,
    ) -> Self {
        Self {
            state: RwLock::new(RegistryState::new()),
            preferences,
            flow,
            sorting: SortingEngine::new(),
            dispatcher,
        }
    }

    fn check_content_sizes(request: &NotificationRequest) -> Result<(), BrokerError> {
        if let Some(size) = request.content.icon_size {
            if size > MAX_ICON_BYTES {
                return Err(BrokerError::ContentOversize {
                    content: "icon",
                    size,
                    limit: MAX_ICON_BYTES,
                });
            }
        }
        if let Some(size) = request.content.picture_size {
            if size > MAX_PICTURE_BYTES {
                return Err(BrokerError::ContentOversize {
                    content: "picture",
                    size,
                    limit: MAX_PICTURE_BYTES,
                });
            }
        }
        Ok(())
    }

    /// Admits a request published on this device.
    ///
    /// Validation, flow admission for net-new keys, the table mutation, the
    /// sorting recompute, and the event enqueue happen under one exclusive
    /// section. Republishing an existing key replaces the record in place
    /// and bypasses flow control.
    pub async fn publish_local(
        &self,
        request: NotificationRequest,
        remind_type: RemindType,
    ) -> Result<NotificationKey, BrokerError> {
        Self::check_content_sizes(&request)?;
        let mut state = self.state.write().await;
        let slot = self
            .preferences
            .check_publish_allowed(&request.bundle, request.slot_type)
            .await?;
        let key = request.key();
        let is_new = !state.active.contains_key(&key);
        if is_new {
            self.flow.try_admit(
                &request.bundle,
                state.bundle_count(&request.bundle),
                state.active.len(),
                Instant::now(),
            )?;
        }
        self.upsert(
            &mut state,
            request,
            NotificationOrigin::Local,
            remind_type,
            slot.importance,
        );
        Ok(key)
    }

    /// Admits a request mirrored from another device.
    ///
    /// The publishing device already ran slot and flow checks; only the
    /// absolute ceilings apply here so a chatty peer cannot overflow the
    /// table.
    pub async fn publish_remote(
        &self,
        request: NotificationRequest,
        device: DeviceId,
        remind_type: RemindType,
        importance: Importance,
    ) -> Result<NotificationKey, BrokerError> {
        let mut state = self.state.write().await;
        let key = request.key();
        if !state.active.contains_key(&key) {
            if state.active.len() >= MAX_ACTIVE_TOTAL {
                return Err(BrokerError::OverMaxActiveTotal {
                    limit: MAX_ACTIVE_TOTAL,
                });
            }
            if state.bundle_count(&request.bundle) >= MAX_ACTIVE_PER_BUNDLE {
                return Err(BrokerError::OverMaxActivePerBundle {
                    bundle_name: request.bundle.bundle_name().to_string(),
                    limit: MAX_ACTIVE_PER_BUNDLE,
                });
            }
        }
        self.upsert(
            &mut state,
            request,
            NotificationOrigin::Remote(device),
            remind_type,
            importance,
        );
        Ok(key)
    }

    fn upsert(
        &self,
        state: &mut RegistryState,
        request: NotificationRequest,
        origin: NotificationOrigin,
        remind_type: RemindType,
        importance: Importance,
    ) {
        let mut record =
            ActiveNotification::new(request, origin, remind_type, importance, Utc::now());
        let user_id = record.bundle().user_id();
        match state.active.remove(&record.key) {
            Some(previous) => {
                // A replace keeps the original admission time; the displaced
                // version goes to the recent ring like a removal would.
                record.created_at = previous.created_at;
                debug!(key = %record.key, "Notification replaced.");
                state.push_recent(previous);
            }
            None => {
                state.count_insert(record.bundle());
                debug!(key = %record.key, total = state.active.len() + 1, "Notification admitted.");
            }
        }
        state.active.insert(record.key.clone(), record.clone());
        let snapshot = self.recompute(state, user_id);
        self.dispatcher.fanout(&[
            SubscriberEvent::Consumed {
                notification: record.clone(),
            },
            SubscriberEvent::ConsumedWithSorting {
                notification: record,
                snapshot,
            },
        ]);
    }

    /// Removes one notification.
    ///
    /// Absent keys are an error so callers learn whether anything was
    /// removed. Unremovable records survive unless `force` is set; force is
    /// reserved for the owner, privileged sweeps, and mirrored deletes.
    pub async fn remove_by_key(
        &self,
        key: &NotificationKey,
        reason: DeleteReason,
        force: bool,
    ) -> Result<ActiveNotification, BrokerError> {
        let mut state = self.state.write().await;
        let record = state
            .active
            .remove(key)
            .ok_or_else(|| BrokerError::NotificationNotExists { key: key.clone() })?;
        if record.request.flags.unremovable && !force {
            state.active.insert(key.clone(), record);
            return Err(BrokerError::Unremovable { key: key.clone() });
        }
        let user_id = record.bundle().user_id();
        state.count_remove(record.bundle());
        state.push_recent(record.clone());
        info!(key = %key, reason = %reason, "Notification removed.");
        let snapshot = self.recompute(&mut state, user_id);
        self.dispatcher.fanout(&[
            SubscriberEvent::Canceled {
                notification: record.clone(),
            },
            SubscriberEvent::CanceledWithSorting {
                notification: record.clone(),
                snapshot,
                reason,
            },
        ]);
        Ok(record)
    }

    /// Removes every notification of one bundle, in one mutation.
    ///
    /// Without `force`, unremovable records are skipped and stay active.
    /// Removing from a bundle with nothing active is a no-op, not an error.
    pub async fn remove_by_bundle(
        &self,
        bundle: &BundleIdentity,
        reason: DeleteReason,
        force: bool,
    ) -> Result<Vec<ActiveNotification>, BrokerError> {
        let mut state = self.state.write().await;
        let keys: Vec<NotificationKey> = state
            .active
            .values()
            .filter(|n| n.bundle() == bundle)
            .filter(|n| force || !n.request.flags.unremovable)
            .map(|n| n.key.clone())
            .collect();
        Ok(self.remove_batch(&mut state, keys, bundle.user_id(), reason))
    }

    /// Removes every notification belonging to `user_id`.
    pub async fn remove_all(
        &self,
        user_id: i32,
        reason: DeleteReason,
        force: bool,
    ) -> Result<Vec<ActiveNotification>, BrokerError> {
        let mut state = self.state.write().await;
        let keys: Vec<NotificationKey> = state
            .active
            .values()
            .filter(|n| n.bundle().user_id() == user_id)
            .filter(|n| force || !n.request.flags.unremovable)
            .map(|n| n.key.clone())
            .collect();
        Ok(self.remove_batch(&mut state, keys, user_id, reason))
    }

    /// Shared tail of the batch removals: one recompute, one event pair per
    /// removed record, all pairs carrying the final snapshot.
    fn remove_batch(
        &self,
        state: &mut RegistryState,
        keys: Vec<NotificationKey>,
        user_id: i32,
        reason: DeleteReason,
    ) -> Vec<ActiveNotification> {
        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = state.active.remove(&key) {
                state.count_remove(record.bundle());
                state.push_recent(record.clone());
                removed.push(record);
            }
        }
        if removed.is_empty() {
            return removed;
        }
        info!(count = removed.len(), reason = %reason, "Notifications removed in batch.");
        let snapshot = self.recompute(state, user_id);
        let mut events = Vec::with_capacity(removed.len() * 2);
        for record in &removed {
            events.push(SubscriberEvent::Canceled {
                notification: record.clone(),
            });
            events.push(SubscriberEvent::CanceledWithSorting {
                notification: record.clone(),
                snapshot: snapshot.clone(),
                reason,
            });
        }
        self.dispatcher.fanout(&events);
        removed
    }

    fn recompute(&self, state: &mut RegistryState, user_id: i32) -> SortingSnapshot {
        let visible: Vec<&ActiveNotification> = state
            .active
            .values()
            .filter(|n| n.bundle().user_id() == user_id)
            .collect();
        self.sorting.recompute(user_id, visible)
    }

    // ----- Queries -----

    pub async fn get(&self, key: &NotificationKey) -> Option<ActiveNotification> {
        self.state.read().await.active.get(key).cloned()
    }

    pub async fn get_all_for_bundle(&self, bundle: &BundleIdentity) -> Vec<ActiveNotification> {
        let state = self.state.read().await;
        let mut items: Vec<ActiveNotification> = state
            .active
            .values()
            .filter(|n| n.bundle() == bundle)
            .cloned()
            .collect();
        items.sort_by(|a, b| sorting::compare(a, b));
        items
    }

    /// All of a user's active notifications in presentation order.
    pub async fn get_all_for_user(&self, user_id: i32) -> Vec<ActiveNotification> {
        let state = self.state.read().await;
        let mut items: Vec<ActiveNotification> = state
            .active
            .values()
            .filter(|n| n.bundle().user_id() == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| sorting::compare(a, b));
        items
    }

    pub async fn count_for_bundle(&self, bundle: &BundleIdentity) -> usize {
        self.state.read().await.bundle_count(bundle)
    }

    pub async fn total_count(&self) -> usize {
        self.state.read().await.active.len()
    }

    /// Recently removed notifications, newest first.
    pub async fn recent(&self) -> Vec<ActiveNotification> {
        self.state.read().await.recent.iter().cloned().collect()
    }

    /// Resizes the recent ring. Shrinking drops the oldest entries.
    pub async fn set_recent_capacity(&self, capacity: usize) -> Result<(), BrokerError> {
        if capacity == 0 {
            return Err(BrokerError::InvalidParam(
                "Recent notification count must be at least 1.".to_string(),
            ));
        }
        let mut state = self.state.write().await;
        state.recent_capacity = capacity;
        state.recent.truncate(capacity);
        Ok(())
    }

    /// Finds the active record mirrored from `device` with the given
    /// publisher-side identity.
    pub async fn find_remote(
        &self,
        device: &DeviceId,
        bundle_name: &str,
        label: &str,
        id: i32,
    ) -> Option<NotificationKey> {
        let state = self.state.read().await;
        state
            .active
            .values()
            .find(|n| {
                n.origin.device() == Some(device)
                    && n.bundle().bundle_name() == bundle_name
                    && n.request.label == label
                    && n.request.id == id
            })
            .map(|n| n.key.clone())
    }

    /// Version of the snapshot produced by the latest mutation.
    pub fn sorting_version(&self) -> u64 {
        self.sorting.current_version()
    }
}
