//! The preference store: slots, slot groups, bundle properties, and
//! do-not-disturb profiles behind one injected service object.
//!
//! Every mutation follows copy-then-commit: clone the current state, apply
//! the change to the clone, persist the clone, and only then swap it in.
//! A failed persist leaves the in-memory state untouched, so memory never
//! runs ahead of disk.

use super::persistence::PreferencesPersistenceProvider;
use super::types::{
    truncate_description, BundleEntry, BundlePropertyKind, BundlePropertyValue,
    DoNotDisturbProfile, DoNotDisturbType, PreferencesState, Slot, SlotGroup,
};
use crate::error::BrokerError;
use crate::identity::IdentityResolver;
use crate::limits::{MAX_SLOTS_PER_BUNDLE, MAX_SLOT_GROUPS_PER_BUNDLE};
use crate::types::SlotType;
use chrono::{DateTime, Utc};
use herald_core::types::BundleIdentity;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub struct PreferencesStore {
    state: RwLock<PreferencesState>,
    provider: Arc<dyn PreferencesPersistenceProvider>,
    identity: Arc<dyn IdentityResolver>,
}

impl PreferencesStore {
    /// Loads the persisted state and builds the store.
    ///
    /// A corrupt or unreadable record is a startup failure; silently starting
    /// from defaults would discard user policy.
    pub async fn load(
        provider: Arc<dyn PreferencesPersistenceProvider>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Result<Self, BrokerError> {
        let state = provider.load().await?;
        info!(
            bundles = state.bundles.len(),
            "Preference store loaded."
        );
        Ok(Self {
            state: RwLock::new(state),
            provider,
            identity,
        })
    }

    /// Applies `mutate` to a copy of the state, persists the copy, and
    /// commits it. Holding the write lock across the save keeps mutations
    /// serialized; readers see the previous state until the new one is
    /// durable.
    async fn commit<T>(
        &self,
        mutate: impl FnOnce(&mut PreferencesState) -> Result<T, BrokerError>,
    ) -> Result<T, BrokerError> {
        let mut guard = self.state.write().await;
        let mut draft = guard.clone();
        let outcome = mutate(&mut draft)?;
        self.provider.save(&draft).await?;
        *guard = draft;
        Ok(outcome)
    }

    fn entry<'a>(
        state: &'a PreferencesState,
        bundle: &BundleIdentity,
    ) -> Result<&'a BundleEntry, BrokerError> {
        state.bundle(bundle).ok_or_else(|| BrokerError::BundleNotExist {
            bundle_name: bundle.bundle_name().to_string(),
        })
    }

    fn entry_mut<'a>(
        state: &'a mut PreferencesState,
        bundle: &BundleIdentity,
    ) -> Result<&'a mut BundleEntry, BrokerError> {
        state.bundle_mut(bundle).ok_or_else(|| BrokerError::BundleNotExist {
            bundle_name: bundle.bundle_name().to_string(),
        })
    }

    // ----- Slots -----

    pub async fn add_slot(&self, bundle: &BundleIdentity, slot: Slot) -> Result<(), BrokerError> {
        self.add_slots(bundle, vec![slot]).await
    }

    /// Adds the given slots, creating the bundle record on its first write.
    ///
    /// The batch is all-or-nothing: when it would push the bundle past the
    /// slot cap, nothing is added. Slots whose type already exists are left
    /// untouched so user customization survives repeated registration.
    pub async fn add_slots(
        &self,
        bundle: &BundleIdentity,
        slots: Vec<Slot>,
    ) -> Result<(), BrokerError> {
        if slots.is_empty() {
            return Err(BrokerError::InvalidParam(
                "Slot list cannot be empty.".to_string(),
            ));
        }
        let enabled_default = self.identity.default_notifications_enabled(bundle).await;
        let bundle = bundle.clone();
        self.commit(move |state| {
            let entry = state
                .bundles
                .entry(bundle.storage_key())
                .or_insert_with(|| BundleEntry::new(bundle.clone(), enabled_default));
            let mut missing: Vec<Slot> = Vec::new();
            for mut slot in slots {
                let already_present = entry.slot(slot.slot_type).is_some()
                    || missing.iter().any(|s: &Slot| s.slot_type == slot.slot_type);
                if already_present {
                    continue;
                }
                slot.description = truncate_description(&slot.description);
                missing.push(slot);
            }
            if entry.slots.len() + missing.len() > MAX_SLOTS_PER_BUNDLE {
                return Err(BrokerError::SlotExceedsMax {
                    bundle_name: bundle.bundle_name().to_string(),
                    limit: MAX_SLOTS_PER_BUNDLE,
                });
            }
            let added = missing.len();
            entry.slots.extend(missing);
            debug!(
                bundle = %bundle,
                added,
                "Slots added."
            );
            Ok(())
        })
        .await
    }

    /// Replaces an existing slot. Updating never creates.
    pub async fn update_slot(
        &self,
        bundle: &BundleIdentity,
        mut slot: Slot,
    ) -> Result<(), BrokerError> {
        let bundle = bundle.clone();
        self.commit(move |state| {
            let entry = Self::entry_mut(state, &bundle)?;
            slot.description = truncate_description(&slot.description);
            let current = entry
                .slot_mut(slot.slot_type)
                .ok_or(BrokerError::SlotTypeNotExist {
                    slot_type: slot.slot_type,
                })?;
            *current = slot;
            Ok(())
        })
        .await
    }

    pub async fn remove_slot(
        &self,
        bundle: &BundleIdentity,
        slot_type: SlotType,
    ) -> Result<(), BrokerError> {
        let bundle = bundle.clone();
        self.commit(move |state| {
            let entry = Self::entry_mut(state, &bundle)?;
            let before = entry.slots.len();
            entry.slots.retain(|s| s.slot_type != slot_type);
            if entry.slots.len() == before {
                return Err(BrokerError::SlotTypeNotExist { slot_type });
            }
            Ok(())
        })
        .await
    }

    pub async fn remove_all_slots(&self, bundle: &BundleIdentity) -> Result<(), BrokerError> {
        let bundle = bundle.clone();
        self.commit(move |state| {
            let entry = Self::entry_mut(state, &bundle)?;
            entry.slots.clear();
            Ok(())
        })
        .await
    }

    pub async fn slot(
        &self,
        bundle: &BundleIdentity,
        slot_type: SlotType,
    ) -> Result<Slot, BrokerError> {
        let state = self.state.read().await;
        let entry = Self::entry(&state, bundle)?;
        entry
            .slot(slot_type)
            .cloned()
            .ok_or(BrokerError::SlotTypeNotExist { slot_type })
    }

    pub async fn slots(&self, bundle: &BundleIdentity) -> Result<Vec<Slot>, BrokerError> {
        let state = self.state.read().await;
        Ok(Self::entry(&state, bundle)?.slots.clone())
    }

    // ----- Slot groups -----

    /// Adds slot groups, all-or-nothing against the group cap. Groups whose
    /// id already exists are left untouched.
    pub async fn add_slot_groups(
        &self,
        bundle: &BundleIdentity,
        groups: Vec<SlotGroup>,
    ) -> Result<(), BrokerError> {
        if groups.is_empty() {
            return Err(BrokerError::InvalidParam(
                "Slot group list cannot be empty.".to_string(),
            ));
        }
        for group in &groups {
            if group.group_id.is_empty() {
                return Err(BrokerError::SlotGroupIdInvalid {
                    group_id: group.group_id.clone(),
                });
            }
        }
        let enabled_default = self.identity.default_notifications_enabled(bundle).await;
        let bundle = bundle.clone();
        self.commit(move |state| {
            let entry = state
                .bundles
                .entry(bundle.storage_key())
                .or_insert_with(|| BundleEntry::new(bundle.clone(), enabled_default));
            let mut missing: Vec<SlotGroup> = Vec::new();
            for mut group in groups {
                let already_present = entry.group(&group.group_id).is_some()
                    || missing.iter().any(|g: &SlotGroup| g.group_id == group.group_id);
                if already_present {
                    continue;
                }
                group.description = truncate_description(&group.description);
                missing.push(group);
            }
            if entry.groups.len() + missing.len() > MAX_SLOT_GROUPS_PER_BUNDLE {
                return Err(BrokerError::SlotGroupExceedsMax {
                    bundle_name: bundle.bundle_name().to_string(),
                    limit: MAX_SLOT_GROUPS_PER_BUNDLE,
                });
            }
            entry.groups.extend(missing);
            Ok(())
        })
        .await
    }

    pub async fn update_slot_group(
        &self,
        bundle: &BundleIdentity,
        mut group: SlotGroup,
    ) -> Result<(), BrokerError> {
        if group.group_id.is_empty() {
            return Err(BrokerError::SlotGroupIdInvalid {
                group_id: group.group_id,
            });
        }
        let bundle = bundle.clone();
        self.commit(move |state| {
            let entry = Self::entry_mut(state, &bundle)?;
            group.description = truncate_description(&group.description);
            let current =
                entry
                    .group_mut(&group.group_id)
                    .ok_or_else(|| BrokerError::SlotGroupNotExist {
                        group_id: group.group_id.clone(),
                    })?;
            *current = group;
            Ok(())
        })
        .await
    }

    /// Removes a group and detaches any slots that pointed at it.
    pub async fn remove_slot_group(
        &self,
        bundle: &BundleIdentity,
        group_id: &str,
    ) -> Result<(), BrokerError> {
        if group_id.is_empty() {
            return Err(BrokerError::SlotGroupIdInvalid {
                group_id: group_id.to_string(),
            });
        }
        let bundle = bundle.clone();
        let group_id = group_id.to_string();
        self.commit(move |state| {
            let entry = Self::entry_mut(state, &bundle)?;
            let before = entry.groups.len();
            entry.groups.retain(|g| g.group_id != group_id);
            if entry.groups.len() == before {
                return Err(BrokerError::SlotGroupNotExist { group_id });
            }
            for slot in &mut entry.slots {
                if slot.group_id.as_deref() == Some(group_id.as_str()) {
                    slot.group_id = None;
                }
            }
            Ok(())
        })
        .await
    }

    pub async fn slot_group(
        &self,
        bundle: &BundleIdentity,
        group_id: &str,
    ) -> Result<SlotGroup, BrokerError> {
        let state = self.state.read().await;
        let entry = Self::entry(&state, bundle)?;
        entry
            .group(group_id)
            .cloned()
            .ok_or_else(|| BrokerError::SlotGroupNotExist {
                group_id: group_id.to_string(),
            })
    }

    pub async fn slot_groups(
        &self,
        bundle: &BundleIdentity,
    ) -> Result<Vec<SlotGroup>, BrokerError> {
        let state = self.state.read().await;
        Ok(Self::entry(&state, bundle)?.groups.clone())
    }

    pub async fn slots_in_group(
        &self,
        bundle: &BundleIdentity,
        group_id: &str,
    ) -> Result<Vec<Slot>, BrokerError> {
        let state = self.state.read().await;
        let entry = Self::entry(&state, bundle)?;
        if entry.group(group_id).is_none() {
            return Err(BrokerError::SlotGroupNotExist {
                group_id: group_id.to_string(),
            });
        }
        Ok(entry
            .slots
            .iter()
            .filter(|s| s.group_id.as_deref() == Some(group_id))
            .cloned()
            .collect())
    }

    // ----- Bundle properties -----

    pub async fn property(
        &self,
        bundle: &BundleIdentity,
        kind: BundlePropertyKind,
    ) -> Result<BundlePropertyValue, BrokerError> {
        let state = self.state.read().await;
        Ok(Self::entry(&state, bundle)?.props.get(kind))
    }

    /// Sets one property, creating the bundle record on its first write.
    pub async fn set_property(
        &self,
        bundle: &BundleIdentity,
        kind: BundlePropertyKind,
        value: BundlePropertyValue,
    ) -> Result<(), BrokerError> {
        let enabled_default = self.identity.default_notifications_enabled(bundle).await;
        let bundle = bundle.clone();
        self.commit(move |state| {
            let entry = state
                .bundles
                .entry(bundle.storage_key())
                .or_insert_with(|| BundleEntry::new(bundle.clone(), enabled_default));
            entry.props.set(kind, value)
        })
        .await
    }

    // ----- Do-not-disturb -----

    /// The user's profile, or the inactive default when none was set.
    pub async fn dnd_profile(&self, user_id: i32) -> DoNotDisturbProfile {
        let state = self.state.read().await;
        state.dnd_profile(user_id).cloned().unwrap_or_default()
    }

    pub async fn set_dnd_profile(
        &self,
        user_id: i32,
        profile: DoNotDisturbProfile,
    ) -> Result<(), BrokerError> {
        match profile.dnd_type {
            DoNotDisturbType::Once | DoNotDisturbType::Clearly
                if profile.end <= profile.begin =>
            {
                return Err(BrokerError::InvalidParam(
                    "Do-not-disturb window must end after it begins.".to_string(),
                ));
            }
            _ => {}
        }
        self.commit(move |state| {
            state.set_dnd_profile(user_id, profile);
            Ok(())
        })
        .await
    }

    pub async fn is_dnd_active(&self, user_id: i32, now: DateTime<Utc>) -> bool {
        self.dnd_profile(user_id).await.covers(now)
    }

    // ----- Admission and policy reads -----

    /// Checks whether `bundle` may publish through `slot_type` and returns
    /// the slot that governs the notification.
    pub async fn check_publish_allowed(
        &self,
        bundle: &BundleIdentity,
        slot_type: SlotType,
    ) -> Result<Slot, BrokerError> {
        let state = self.state.read().await;
        let entry = state
            .bundle(bundle)
            .ok_or(BrokerError::SlotTypeNotExist { slot_type })?;
        if !entry.props.notifications_enabled {
            return Err(BrokerError::NotAllowed(format!(
                "Notifications are disabled for bundle '{}'.",
                bundle.bundle_name()
            )));
        }
        let slot = entry
            .slot(slot_type)
            .ok_or(BrokerError::SlotTypeNotExist { slot_type })?;
        if !slot.enabled {
            return Err(BrokerError::NotAllowed(format!(
                "Slot '{}' is disabled for bundle '{}'.",
                slot_type,
                bundle.bundle_name()
            )));
        }
        Ok(slot.clone())
    }

    /// Whether notifications of `bundle` may be mirrored to other devices.
    /// Bundles without a record keep the default.
    pub async fn distributed_enabled(&self, bundle: &BundleIdentity) -> bool {
        let state = self.state.read().await;
        state
            .bundle(bundle)
            .map(|e| e.props.distributed_enabled)
            .unwrap_or(true)
    }

    // ----- Lifecycle -----

    /// Drops every preference of `bundle`. Purging an unknown bundle is a
    /// no-op so uninstall cleanup can run unconditionally.
    pub async fn purge_bundle(&self, bundle: &BundleIdentity) -> Result<(), BrokerError> {
        let bundle = bundle.clone();
        self.commit(move |state| {
            if state.bundles.remove(&bundle.storage_key()).is_some() {
                info!(bundle = %bundle, "Bundle preferences purged.");
            }
            Ok(())
        })
        .await
    }
}
