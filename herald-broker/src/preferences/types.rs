//! Durable preference records: slots, slot groups, bundle properties, and
//! do-not-disturb profiles.
//!
//! These types are the persisted shape of the store. Collections are kept as
//! vectors rather than enum-keyed maps so the serialized TOML stays plain
//! tables; cardinality is capped (5 slots, 4 groups per bundle) so linear
//! lookups are fine.

use crate::error::BrokerError;
use crate::limits::MAX_DESCRIPTION_LEN;
use crate::types::{Importance, SlotType};
use chrono::{DateTime, Timelike, Utc};
use herald_core::types::BundleIdentity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Truncates a description to the storage cap. Applied on write, never on
/// read, and idempotent under re-truncation.
pub fn truncate_description(input: &str) -> String {
    if input.chars().count() <= MAX_DESCRIPTION_LEN {
        input.to_string()
    } else {
        input.chars().take(MAX_DESCRIPTION_LEN).collect()
    }
}

/// How much of a notification is shown on the lock screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LockscreenVisibility {
    #[default]
    Public,
    Private,
    Secret,
}

/// Per-category notification policy of a bundle. At most one slot exists per
/// (bundle, slot type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub slot_type: SlotType,
    pub enabled: bool,
    pub importance: Importance,
    pub sound_enabled: bool,
    pub vibration_enabled: bool,
    pub show_badge: bool,
    pub lockscreen_visibility: LockscreenVisibility,
    pub bypass_dnd: bool,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl Slot {
    /// Creates a slot with the policy defaults of its type.
    pub fn new(slot_type: SlotType) -> Self {
        let (importance, sound_enabled, vibration_enabled, show_badge) = match slot_type {
            SlotType::SocialCommunication => (Importance::High, true, true, true),
            SlotType::ServiceReminder => (Importance::Normal, true, false, true),
            SlotType::ContentInformation => (Importance::Low, false, false, true),
            SlotType::LiveView => (Importance::Normal, false, false, true),
            SlotType::CustomerService => (Importance::Normal, true, false, true),
            SlotType::Custom => (Importance::Normal, false, false, true),
            SlotType::Other => (Importance::Min, false, false, false),
        };
        Self {
            slot_type,
            enabled: true,
            importance,
            sound_enabled,
            vibration_enabled,
            show_badge,
            lockscreen_visibility: LockscreenVisibility::default(),
            bypass_dnd: false,
            description: String::new(),
            group_id: None,
        }
    }
}

/// Named collection of slots for UI grouping, scoped to one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotGroup {
    pub group_id: String,
    pub name: String,
    pub description: String,
    pub disabled: bool,
}

/// Per-bundle scalar settings. Created lazily on the bundle's first write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleProperties {
    pub show_badge: bool,
    pub badge_number: u32,
    pub importance: Importance,
    pub notifications_enabled: bool,
    pub private_allowed: bool,
    pub dialog_shown: bool,
    pub distributed_enabled: bool,
}

impl Default for BundleProperties {
    fn default() -> Self {
        Self {
            show_badge: true,
            badge_number: 0,
            importance: Importance::Normal,
            notifications_enabled: true,
            private_allowed: false,
            dialog_shown: false,
            distributed_enabled: true,
        }
    }
}

/// Selects one [`BundleProperties`] field for get/set dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundlePropertyKind {
    ShowBadge,
    BadgeNumber,
    Importance,
    NotificationsEnabled,
    PrivateAllowed,
    DialogShown,
    DistributedEnabled,
}

/// A typed property value paired with [`BundlePropertyKind`] on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundlePropertyValue {
    Bool(bool),
    Number(u32),
    Importance(Importance),
}

impl BundleProperties {
    /// Reads the field selected by `kind`.
    pub fn get(&self, kind: BundlePropertyKind) -> BundlePropertyValue {
        match kind {
            BundlePropertyKind::ShowBadge => BundlePropertyValue::Bool(self.show_badge),
            BundlePropertyKind::BadgeNumber => BundlePropertyValue::Number(self.badge_number),
            BundlePropertyKind::Importance => BundlePropertyValue::Importance(self.importance),
            BundlePropertyKind::NotificationsEnabled => {
                BundlePropertyValue::Bool(self.notifications_enabled)
            }
            BundlePropertyKind::PrivateAllowed => BundlePropertyValue::Bool(self.private_allowed),
            BundlePropertyKind::DialogShown => BundlePropertyValue::Bool(self.dialog_shown),
            BundlePropertyKind::DistributedEnabled => {
                BundlePropertyValue::Bool(self.distributed_enabled)
            }
        }
    }

    /// Writes the field selected by `kind`.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::InvalidParam` when the value variant does not
    /// match the field's type.
    pub fn set(
        &mut self,
        kind: BundlePropertyKind,
        value: BundlePropertyValue,
    ) -> Result<(), BrokerError> {
        match (kind, value) {
            (BundlePropertyKind::ShowBadge, BundlePropertyValue::Bool(v)) => {
                self.show_badge = v;
            }
            (BundlePropertyKind::BadgeNumber, BundlePropertyValue::Number(v)) => {
                self.badge_number = v;
            }
            (BundlePropertyKind::Importance, BundlePropertyValue::Importance(v)) => {
                self.importance = v;
            }
            (BundlePropertyKind::NotificationsEnabled, BundlePropertyValue::Bool(v)) => {
                self.notifications_enabled = v;
            }
            (BundlePropertyKind::PrivateAllowed, BundlePropertyValue::Bool(v)) => {
                self.private_allowed = v;
            }
            (BundlePropertyKind::DialogShown, BundlePropertyValue::Bool(v)) => {
                self.dialog_shown = v;
            }
            (BundlePropertyKind::DistributedEnabled, BundlePropertyValue::Bool(v)) => {
                self.distributed_enabled = v;
            }
            (kind, value) => {
                return Err(BrokerError::InvalidParam(format!(
                    "Property {:?} cannot be set from value {:?}.",
                    kind, value
                )));
            }
        }
        Ok(())
    }
}

/// Kind of a do-not-disturb schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DoNotDisturbType {
    /// No do-not-disturb window.
    #[default]
    None,
    /// A single `begin..end` window.
    Once,
    /// A daily window defined by the time-of-day of `begin` and `end`.
    Daily,
    /// A `begin..end` window that stays active until explicitly cleared.
    Clearly,
}

/// Per-user do-not-disturb schedule.
///
/// The profile never blocks admission; `covers` is presentation policy
/// consulted by readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoNotDisturbProfile {
    pub dnd_type: DoNotDisturbType,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Default for DoNotDisturbProfile {
    fn default() -> Self {
        Self {
            dnd_type: DoNotDisturbType::None,
            begin: DateTime::<Utc>::UNIX_EPOCH,
            end: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl DoNotDisturbProfile {
    /// Whether the schedule is active at `now`.
    ///
    /// `Daily` compares the time of day and wraps across midnight when the
    /// window begins after it ends (e.g. 22:00 to 07:00).
    pub fn covers(&self, now: DateTime<Utc>) -> bool {
        match self.dnd_type {
            DoNotDisturbType::None => false,
            DoNotDisturbType::Once | DoNotDisturbType::Clearly => {
                self.begin <= now && now < self.end
            }
            DoNotDisturbType::Daily => {
                let begin = self.begin.num_seconds_from_midnight();
                let end = self.end.num_seconds_from_midnight();
                let at = now.num_seconds_from_midnight();
                if begin <= end {
                    begin <= at && at < end
                } else {
                    at >= begin || at < end
                }
            }
        }
    }
}

/// All preferences of one bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub bundle: BundleIdentity,
    #[serde(default)]
    pub slots: Vec<Slot>,
    #[serde(default)]
    pub groups: Vec<SlotGroup>,
    #[serde(default)]
    pub props: BundleProperties,
}

impl BundleEntry {
    /// Creates the record for a bundle's first write. `notifications_enabled`
    /// comes from the platform's API-compatibility check for the bundle.
    pub fn new(bundle: BundleIdentity, notifications_enabled: bool) -> Self {
        Self {
            bundle,
            slots: Vec::new(),
            groups: Vec::new(),
            props: BundleProperties {
                notifications_enabled,
                ..BundleProperties::default()
            },
        }
    }

    pub fn slot(&self, slot_type: SlotType) -> Option<&Slot> {
        self.slots.iter().find(|s| s.slot_type == slot_type)
    }

    pub fn slot_mut(&mut self, slot_type: SlotType) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.slot_type == slot_type)
    }

    pub fn group(&self, group_id: &str) -> Option<&SlotGroup> {
        self.groups.iter().find(|g| g.group_id == group_id)
    }

    pub fn group_mut(&mut self, group_id: &str) -> Option<&mut SlotGroup> {
        self.groups.iter_mut().find(|g| g.group_id == group_id)
    }
}

/// The authoritative preference state: every bundle record plus per-user
/// do-not-disturb profiles.
///
/// Keys are stringified (`BundleIdentity::storage_key` for bundles, the
/// decimal user id for profiles) so the state serializes as plain TOML
/// tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PreferencesState {
    #[serde(default)]
    pub bundles: BTreeMap<String, BundleEntry>,
    #[serde(default)]
    pub dnd: BTreeMap<String, DoNotDisturbProfile>,
}

impl PreferencesState {
    pub fn bundle(&self, bundle: &BundleIdentity) -> Option<&BundleEntry> {
        self.bundles.get(&bundle.storage_key())
    }

    pub fn bundle_mut(&mut self, bundle: &BundleIdentity) -> Option<&mut BundleEntry> {
        self.bundles.get_mut(&bundle.storage_key())
    }

    pub fn dnd_profile(&self, user_id: i32) -> Option<&DoNotDisturbProfile> {
        self.dnd.get(&user_id.to_string())
    }

    pub fn set_dnd_profile(&mut self, user_id: i32, profile: DoNotDisturbProfile) {
        self.dnd.insert(user_id.to_string(), profile);
    }
}
