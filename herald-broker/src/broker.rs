//! The broker facade: authorization, component wiring, and the mirror
//! plumbing around registry mutations.
//!
//! Every public operation takes the resolved [`CallerContext`]; ownership
//! and privilege checks happen here so the inner components can trust their
//! inputs. Distributed mirroring wraps the local mutation and never fails
//! it: a failed mirror write is logged and local state stays authoritative.

use crate::dispatch::{NotificationSubscriber, SubscriberDispatcher, SubscriberFilter, SubscriberHandle};
use crate::distributed::store::ReplicatedStore;
use crate::distributed::DistributedSync;
use crate::error::BrokerError;
use crate::events::SubscriberEvent;
use crate::flow_control::FlowController;
use crate::identity::{CallerContext, IdentityResolver};
use crate::preferences::{
    BundlePropertyKind, BundlePropertyValue, DoNotDisturbProfile, PreferencesPersistenceProvider,
    PreferencesStore, Slot, SlotGroup,
};
use crate::registry::NotificationRegistry;
use crate::types::{
    ActiveNotification, DeleteReason, NotificationKey, NotificationRequest, RemindType, SlotType,
};
use chrono::Utc;
use herald_core::config::BrokerConfig;
use herald_core::types::{BundleIdentity, DeviceId};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct NotificationBroker {
    preferences: Arc<PreferencesStore>,
    registry: Arc<NotificationRegistry>,
    dispatcher: Arc<SubscriberDispatcher>,
    flow: Arc<FlowController>,
    distributed: Option<Arc<DistributedSync>>,
    identity: Arc<dyn IdentityResolver>,
    inbound: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationBroker {
    /// Wires the broker from its collaborators and starts inbound mirroring
    /// when the configuration enables it.
    pub async fn bootstrap(
        config: &BrokerConfig,
        persistence: Arc<dyn PreferencesPersistenceProvider>,
        replicated: Option<Arc<dyn ReplicatedStore>>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Result<Arc<Self>, BrokerError> {
        let preferences = Arc::new(
            PreferencesStore::load(persistence, Arc::clone(&identity)).await?,
        );
        let flow = Arc::new(FlowController::new());
        let dispatcher = Arc::new(SubscriberDispatcher::new());
        let registry = Arc::new(NotificationRegistry::new(
            Arc::clone(&preferences),
            Arc::clone(&flow),
            Arc::clone(&dispatcher),
        ));

        let distributed = if config.distributed.enabled {
            let store = replicated.ok_or_else(|| {
                BrokerError::InvalidParam(
                    "Distributed sync is enabled but no replicated store was provided."
                        .to_string(),
                )
            })?;
            let device = DeviceId::new(&config.distributed.device_id)
                .map_err(|e| BrokerError::InvalidParam(e.to_string()))?;
            Some(Arc::new(DistributedSync::new(
                store,
                device,
                config.distributed.supports_display,
            )))
        } else {
            None
        };

        let broker = Arc::new(Self {
            preferences,
            registry,
            dispatcher,
            flow,
            distributed,
            identity,
            inbound: Mutex::new(None),
        });

        if let Some(sync) = &broker.distributed {
            if let Err(e) = sync.register_local_device().await {
                warn!(error = %e, "Device descriptor could not be published.");
            }
            let handle = Arc::clone(sync).run_inbound(Arc::clone(&broker.registry));
            *broker
                .inbound
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = Some(handle);
            info!(device = %sync.local_device(), "Broker running with distributed sync.");
        } else {
            info!("Broker running without distributed sync.");
        }
        Ok(broker)
    }

    async fn ensure_privileged(&self, caller: &CallerContext) -> Result<(), BrokerError> {
        if self.identity.is_privileged(caller).await {
            Ok(())
        } else {
            Err(BrokerError::NotAllowed(format!(
                "Caller '{}' lacks the privilege for this operation.",
                caller.bundle.bundle_name()
            )))
        }
    }

    async fn ensure_owner_or_privileged(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
    ) -> Result<(), BrokerError> {
        if caller.owns(bundle) || self.identity.is_privileged(caller).await {
            Ok(())
        } else {
            Err(BrokerError::NotAllowed(format!(
                "Caller '{}' may not act on bundle '{}'.",
                caller.bundle.bundle_name(),
                bundle.bundle_name()
            )))
        }
    }

    /// Deletes the replicated entries of records that just left the local
    /// registry. Best effort: local removal already happened and stands.
    async fn unmirror_best_effort(&self, removed: &[ActiveNotification]) {
        let Some(sync) = &self.distributed else {
            return;
        };
        for record in removed.iter().filter(|r| r.request.flags.distributed) {
            if let Err(e) = sync.mirror_removal(record).await {
                warn!(key = %record.key, error = %e, "Mirrored entry could not be deleted.");
            }
        }
    }

    // ----- Publish and cancel (publisher side) -----

    /// Publishes a notification for the caller's bundle.
    pub async fn publish(
        &self,
        caller: &CallerContext,
        request: NotificationRequest,
    ) -> Result<NotificationKey, BrokerError> {
        self.ensure_owner_or_privileged(caller, &request.bundle)
            .await?;

        let mirror = match &self.distributed {
            Some(sync) => {
                let bundle_enabled = self.preferences.distributed_enabled(&request.bundle).await;
                sync.should_mirror(&request, bundle_enabled)
            }
            None => false,
        };
        let remind = match (&self.distributed, mirror) {
            (Some(sync), true) => sync.remind_type().await,
            _ => RemindType::None,
        };

        let key = self.registry.publish_local(request, remind).await?;

        if mirror {
            if let (Some(sync), Some(record)) = (&self.distributed, self.registry.get(&key).await)
            {
                if let Err(e) = sync.mirror_outbound(&record).await {
                    warn!(key = %key, error = %e, "Notification could not be mirrored.");
                }
            }
        }
        Ok(key)
    }

    /// Cancels one of the caller's own notifications by id and label. The
    /// owner may cancel its own continuous tasks.
    pub async fn cancel(
        &self,
        caller: &CallerContext,
        id: i32,
        label: &str,
    ) -> Result<(), BrokerError> {
        let key = NotificationKey::of(&caller.bundle, label, id);
        let removed = self
            .registry
            .remove_by_key(&key, DeleteReason::AppCanceled, true)
            .await?;
        self.unmirror_best_effort(std::slice::from_ref(&removed))
            .await;
        Ok(())
    }

    /// Cancels everything the caller's bundle has active.
    pub async fn cancel_all(&self, caller: &CallerContext) -> Result<usize, BrokerError> {
        let removed = self
            .registry
            .remove_by_bundle(&caller.bundle, DeleteReason::AppCancelAll, true)
            .await?;
        self.unmirror_best_effort(&removed).await;
        Ok(removed.len())
    }

    // ----- Removal (user/system side) -----

    /// Removes one notification on behalf of the user. Continuous tasks
    /// survive this path.
    pub async fn remove(
        &self,
        caller: &CallerContext,
        key: &NotificationKey,
    ) -> Result<(), BrokerError> {
        self.ensure_privileged(caller).await?;
        let removed = self
            .registry
            .remove_by_key(key, DeleteReason::UserCanceled, false)
            .await?;
        self.unmirror_best_effort(std::slice::from_ref(&removed))
            .await;
        Ok(())
    }

    /// Clears a bundle's notifications on behalf of the user, skipping
    /// continuous tasks.
    pub async fn remove_all_for_bundle(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
    ) -> Result<usize, BrokerError> {
        self.ensure_privileged(caller).await?;
        let removed = self
            .registry
            .remove_by_bundle(bundle, DeleteReason::UserCanceled, false)
            .await?;
        self.unmirror_best_effort(&removed).await;
        Ok(removed.len())
    }

    /// Clears a user's notifications, skipping continuous tasks.
    pub async fn remove_all(
        &self,
        caller: &CallerContext,
        user_id: i32,
    ) -> Result<usize, BrokerError> {
        self.ensure_privileged(caller).await?;
        let removed = self
            .registry
            .remove_all(user_id, DeleteReason::UserCanceled, false)
            .await?;
        self.unmirror_best_effort(&removed).await;
        Ok(removed.len())
    }

    /// Drops everything the broker holds for a bundle: active notifications
    /// (continuous tasks included), mirrored entries, preferences, and flow
    /// budget. Run when the bundle is uninstalled.
    pub async fn purge_bundle(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
    ) -> Result<(), BrokerError> {
        self.ensure_privileged(caller).await?;
        let removed = self
            .registry
            .remove_by_bundle(bundle, DeleteReason::OwnerBundleRemoved, true)
            .await?;
        self.unmirror_best_effort(&removed).await;
        self.preferences.purge_bundle(bundle).await?;
        self.flow.forget_bundle(bundle);
        info!(bundle = %bundle, removed = removed.len(), "Bundle purged.");
        Ok(())
    }

    // ----- Preferences -----

    pub async fn add_slot(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
        slot: Slot,
    ) -> Result<(), BrokerError> {
        self.ensure_owner_or_privileged(caller, bundle).await?;
        self.preferences.add_slot(bundle, slot).await
    }

    pub async fn add_slots(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
        slots: Vec<Slot>,
    ) -> Result<(), BrokerError> {
        self.ensure_owner_or_privileged(caller, bundle).await?;
        self.preferences.add_slots(bundle, slots).await
    }

    pub async fn update_slot(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
        slot: Slot,
    ) -> Result<(), BrokerError> {
        self.ensure_owner_or_privileged(caller, bundle).await?;
        self.preferences.update_slot(bundle, slot).await
    }

    pub async fn remove_slot(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
        slot_type: SlotType,
    ) -> Result<(), BrokerError> {
        self.ensure_owner_or_privileged(caller, bundle).await?;
        self.preferences.remove_slot(bundle, slot_type).await
    }

    pub async fn remove_all_slots(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
    ) -> Result<(), BrokerError> {
        self.ensure_owner_or_privileged(caller, bundle).await?;
        self.preferences.remove_all_slots(bundle).await
    }

    pub async fn slot(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
        slot_type: SlotType,
    ) -> Result<Slot, BrokerError> {
        self.ensure_owner_or_privileged(caller, bundle).await?;
        self.preferences.slot(bundle, slot_type).await
    }

    pub async fn slots(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
    ) -> Result<Vec<Slot>, BrokerError> {
        self.ensure_owner_or_privileged(caller, bundle).await?;
        self.preferences.slots(bundle).await
    }

    pub async fn add_slot_groups(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
        groups: Vec<SlotGroup>,
    ) -> Result<(), BrokerError> {
        self.ensure_owner_or_privileged(caller, bundle).await?;
        self.preferences.add_slot_groups(bundle, groups).await
    }

    pub async fn update_slot_group(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
        group: SlotGroup,
    ) -> Result<(), BrokerError> {
        self.ensure_owner_or_privileged(caller, bundle).await?;
        self.preferences.update_slot_group(bundle, group).await
    }

    pub async fn remove_slot_group(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
        group_id: &str,
    ) -> Result<(), BrokerError> {
        self.ensure_owner_or_privileged(caller, bundle).await?;
        self.preferences.remove_slot_group(bundle, group_id).await
    }

    pub async fn slot_group(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
        group_id: &str,
    ) -> Result<SlotGroup, BrokerError> {
        self.ensure_owner_or_privileged(caller, bundle).await?;
        self.preferences.slot_group(bundle, group_id).await
    }

    pub async fn slot_groups(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
    ) -> Result<Vec<SlotGroup>, BrokerError> {
        self.ensure_owner_or_privileged(caller, bundle).await?;
        self.preferences.slot_groups(bundle).await
    }

    pub async fn slots_in_group(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
        group_id: &str,
    ) -> Result<Vec<Slot>, BrokerError> {
        self.ensure_owner_or_privileged(caller, bundle).await?;
        self.preferences.slots_in_group(bundle, group_id).await
    }

    pub async fn property(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
        kind: BundlePropertyKind,
    ) -> Result<BundlePropertyValue, BrokerError> {
        self.ensure_owner_or_privileged(caller, bundle).await?;
        self.preferences.property(bundle, kind).await
    }

    /// Sets a bundle property. Badge and enablement changes are announced
    /// to subscribers after the durable write committed.
    pub async fn set_property(
        &self,
        caller: &CallerContext,
        bundle: &BundleIdentity,
        kind: BundlePropertyKind,
        value: BundlePropertyValue,
    ) -> Result<(), BrokerError> {
        self.ensure_owner_or_privileged(caller, bundle).await?;
        self.preferences.set_property(bundle, kind, value).await?;
        match (kind, value) {
            (BundlePropertyKind::NotificationsEnabled, BundlePropertyValue::Bool(enabled)) => {
                self.dispatcher.fanout(&[SubscriberEvent::EnabledChanged {
                    bundle: bundle.clone(),
                    enabled,
                }]);
            }
            (BundlePropertyKind::BadgeNumber, BundlePropertyValue::Number(badge_number)) => {
                self.dispatcher.fanout(&[SubscriberEvent::BadgeChanged {
                    bundle: bundle.clone(),
                    badge_number,
                }]);
            }
            _ => {}
        }
        Ok(())
    }

    pub async fn dnd_profile(
        &self,
        caller: &CallerContext,
        user_id: i32,
    ) -> Result<DoNotDisturbProfile, BrokerError> {
        self.ensure_user_scope(caller, user_id).await?;
        Ok(self.preferences.dnd_profile(user_id).await)
    }

    /// Sets a user's do-not-disturb profile and announces the change.
    pub async fn set_dnd_profile(
        &self,
        caller: &CallerContext,
        user_id: i32,
        profile: DoNotDisturbProfile,
    ) -> Result<(), BrokerError> {
        self.ensure_user_scope(caller, user_id).await?;
        self.preferences
            .set_dnd_profile(user_id, profile.clone())
            .await?;
        self.dispatcher
            .fanout(&[SubscriberEvent::DoNotDisturbChanged { user_id, profile }]);
        Ok(())
    }

    /// Whether the user's do-not-disturb window covers this instant.
    pub async fn is_dnd_active(
        &self,
        caller: &CallerContext,
        user_id: i32,
    ) -> Result<bool, BrokerError> {
        self.ensure_user_scope(caller, user_id).await?;
        Ok(self.preferences.is_dnd_active(user_id, Utc::now()).await)
    }

    async fn ensure_user_scope(
        &self,
        caller: &CallerContext,
        user_id: i32,
    ) -> Result<(), BrokerError> {
        if caller.bundle.user_id() == user_id || self.identity.is_privileged(caller).await {
            Ok(())
        } else {
            Err(BrokerError::NotAllowed(format!(
                "Caller '{}' may not touch user {}.",
                caller.bundle.bundle_name(),
                user_id
            )))
        }
    }

    // ----- Queries -----

    /// Looks up one active notification. Callers only see their own records
    /// unless privileged; a foreign key reads as absent rather than denied.
    pub async fn get(
        &self,
        caller: &CallerContext,
        key: &NotificationKey,
    ) -> Option<ActiveNotification> {
        let record = self.registry.get(key).await?;
        if caller.owns(record.bundle()) || self.identity.is_privileged(caller).await {
            Some(record)
        } else {
            None
        }
    }

    /// The caller's own active notifications, in presentation order.
    pub async fn active_for_caller(&self, caller: &CallerContext) -> Vec<ActiveNotification> {
        self.registry.get_all_for_bundle(&caller.bundle).await
    }

    /// A user's full active set, in presentation order.
    pub async fn active_for_user(
        &self,
        caller: &CallerContext,
        user_id: i32,
    ) -> Result<Vec<ActiveNotification>, BrokerError> {
        self.ensure_privileged(caller).await?;
        Ok(self.registry.get_all_for_user(user_id).await)
    }

    pub async fn count_for_caller(&self, caller: &CallerContext) -> usize {
        self.registry.count_for_bundle(&caller.bundle).await
    }

    pub async fn total_count(&self, caller: &CallerContext) -> Result<usize, BrokerError> {
        self.ensure_privileged(caller).await?;
        Ok(self.registry.total_count().await)
    }

    /// Recently removed notifications, newest first.
    pub async fn recent(
        &self,
        caller: &CallerContext,
    ) -> Result<Vec<ActiveNotification>, BrokerError> {
        self.ensure_privileged(caller).await?;
        Ok(self.registry.recent().await)
    }

    pub async fn set_recent_capacity(
        &self,
        caller: &CallerContext,
        capacity: usize,
    ) -> Result<(), BrokerError> {
        self.ensure_privileged(caller).await?;
        self.registry.set_recent_capacity(capacity).await
    }

    // ----- Subscribers -----

    pub async fn subscribe(
        &self,
        caller: &CallerContext,
        subscriber: Arc<dyn NotificationSubscriber>,
        filter: SubscriberFilter,
    ) -> Result<(), BrokerError> {
        self.ensure_privileged(caller).await?;
        self.dispatcher.subscribe(subscriber, filter).await
    }

    pub async fn unsubscribe(
        &self,
        caller: &CallerContext,
        handle: SubscriberHandle,
    ) -> Result<(), BrokerError> {
        self.ensure_privileged(caller).await?;
        self.dispatcher.unsubscribe(handle).await
    }

    // ----- Device state -----

    /// Records the local screen turning on or off.
    pub async fn set_screen_on(
        &self,
        caller: &CallerContext,
        on: bool,
    ) -> Result<(), BrokerError> {
        self.ensure_privileged(caller).await?;
        if let Some(sync) = &self.distributed {
            sync.set_local_screen(on).await;
        }
        Ok(())
    }

    /// Stops inbound mirroring and drains subscriber queues.
    pub async fn shutdown(&self) {
        let inbound = {
            self.inbound
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take()
        };
        if let Some(handle) = inbound {
            handle.abort();
        }
        self.dispatcher.shutdown().await;
        info!("Broker shut down.");
    }
}
