//! Domain types for notification requests, active records, and remind policy.

use chrono::{DateTime, Utc};
use herald_core::types::{BundleIdentity, DeviceId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category a notification is published under. Every slot is keyed by one of
/// these, at most one slot per (bundle, type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SlotType {
    SocialCommunication,
    ServiceReminder,
    ContentInformation,
    LiveView,
    CustomerService,
    Custom,
    #[default]
    Other,
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlotType::SocialCommunication => "social-communication",
            SlotType::ServiceReminder => "service-reminder",
            SlotType::ContentInformation => "content-information",
            SlotType::LiveView => "live-view",
            SlotType::CustomerService => "customer-service",
            SlotType::Custom => "custom",
            SlotType::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// Importance level attached to slots, bundles, and active notifications.
/// Ordered ascending so `High > Normal` holds for sorting comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Importance {
    None,
    Min,
    Low,
    #[default]
    Normal,
    High,
}

/// Screen activity as known for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ScreenState {
    /// No status entry has been observed for the device yet.
    #[default]
    Unknown,
    On,
    Off,
}

impl ScreenState {
    /// Unknown is treated as on when applying remind policy.
    fn treated_as_on(self) -> bool {
        !matches!(self, ScreenState::Off)
    }
}

/// Presentation policy attached to distributed notifications, derived from
/// local and remote screen activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RemindType {
    /// Not a distributed notification, or policy not applicable.
    #[default]
    None,
    DeviceActiveRemind,
    DeviceIdleRemind,
    DeviceIdleDoNotRemind,
}

impl RemindType {
    /// Derives the remind type from local and remote screen activity.
    ///
    /// `Unknown` counts as on. When the local screen is on the result depends
    /// on whether a remote screen is also on; a dark local screen alerts only
    /// while every remote screen is dark too.
    pub fn for_screens(local: ScreenState, remote: ScreenState) -> Self {
        match (local.treated_as_on(), remote.treated_as_on()) {
            (true, true) => RemindType::DeviceActiveRemind,
            (true, false) => RemindType::DeviceIdleRemind,
            (false, false) => RemindType::DeviceIdleRemind,
            (false, true) => RemindType::DeviceIdleDoNotRemind,
        }
    }
}

/// Why a notification left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeleteReason {
    /// Dismissed by the device user.
    UserCanceled,
    /// Canceled by the publishing bundle.
    AppCanceled,
    /// Swept by the publishing bundle's cancel-all.
    AppCancelAll,
    /// The owning bundle was uninstalled or purged.
    OwnerBundleRemoved,
    /// Removed by broker policy.
    Policy,
    /// Removal mirrored from a peer device.
    Distributed,
}

impl fmt::Display for DeleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeleteReason::UserCanceled => "user-canceled",
            DeleteReason::AppCanceled => "app-canceled",
            DeleteReason::AppCancelAll => "app-cancel-all",
            DeleteReason::OwnerBundleRemoved => "owner-bundle-removed",
            DeleteReason::Policy => "policy",
            DeleteReason::Distributed => "distributed",
        };
        write!(f, "{}", s)
    }
}

/// Where an active notification entered the registry from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationOrigin {
    Local,
    Remote(DeviceId),
}

impl NotificationOrigin {
    pub fn is_remote(&self) -> bool {
        matches!(self, NotificationOrigin::Remote(_))
    }

    pub fn device(&self) -> Option<&DeviceId> {
        match self {
            NotificationOrigin::Local => None,
            NotificationOrigin::Remote(device) => Some(device),
        }
    }
}

/// Rendering shape of a notification body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ContentKind {
    #[default]
    BasicText,
    LongText,
    Multiline,
    Picture,
    Media,
}

/// Displayable content of a notification.
///
/// Binary payloads (icons, pictures) travel out of band; the request carries
/// only their declared sizes, which are checked against the content caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NotificationContent {
    #[serde(default)]
    pub kind: ContentKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_size: Option<u64>, // Declared icon payload size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture_size: Option<u64>, // Declared picture payload size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>, // Free-form structured extras
}

/// Behavior flags a publisher attaches to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NotificationFlags {
    #[serde(default)]
    pub in_progress: bool, // Long-running task, e.g. a download
    #[serde(default)]
    pub unremovable: bool, // Only the owner or a forced sweep may remove it
    #[serde(default)]
    pub distributed: bool, // Publisher opted in to cross-device mirroring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>, // Collapse group
    #[serde(default)]
    pub group_overview: bool, // This entry summarizes its collapse group
    #[serde(default)]
    pub alert_once: bool, // Replacements stay silent
}

/// A publish request as submitted by a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub bundle: BundleIdentity,
    #[serde(default)]
    pub id: i32, // Publisher-chosen id, 0 when unset
    #[serde(default)]
    pub label: String, // Publisher-chosen label, empty when unset
    #[serde(default)]
    pub slot_type: SlotType,
    #[serde(default)]
    pub content: NotificationContent,
    #[serde(default)]
    pub flags: NotificationFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<String>, // Overrides importance ordering when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_time: Option<DateTime<Utc>>,
}

impl NotificationRequest {
    /// Composite registry key for this request.
    pub fn key(&self) -> NotificationKey {
        NotificationKey::of(&self.bundle, &self.label, self.id)
    }
}

/// Composite key identifying an active notification,
/// `"{user_id}_{uid}_{label}_{id}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotificationKey(String);

impl NotificationKey {
    pub fn of(bundle: &BundleIdentity, label: &str, id: i32) -> Self {
        NotificationKey(format!(
            "{}_{}_{}_{}",
            bundle.user_id(),
            bundle.uid(),
            label,
            id
        ))
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The registry's live record: a request plus broker-assigned state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveNotification {
    pub key: NotificationKey,
    pub request: NotificationRequest,
    pub origin: NotificationOrigin,
    pub remind_type: RemindType,
    /// Effective importance resolved from the slot at admission time.
    pub importance: Importance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActiveNotification {
    pub fn new(
        request: NotificationRequest,
        origin: NotificationOrigin,
        remind_type: RemindType,
        importance: Importance,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: request.key(),
            request,
            origin,
            remind_type,
            importance,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn bundle(&self) -> &BundleIdentity {
        &self.request.bundle
    }
}
