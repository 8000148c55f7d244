//! Events delivered to notification subscribers.
//!
//! Everything a subscriber can observe travels through one enum and one
//! delivery entry point, so adding an event is a compile-checked change for
//! every consumer instead of a new callback to forget.

use crate::preferences::DoNotDisturbProfile;
use crate::sorting::SortingSnapshot;
use crate::types::{ActiveNotification, DeleteReason};
use herald_core::types::BundleIdentity;
use serde::{Deserialize, Serialize};

/// One observable broker event.
///
/// Lifecycle events come in pairs: a plain `Consumed`/`Canceled` followed by
/// its `...WithSorting` sibling carrying the snapshot produced by the same
/// mutation. Snapshots are owned values; a subscriber may hold one as long
/// as it likes without pinning broker state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SubscriberEvent {
    /// Acknowledges a successful subscribe.
    Subscribed,
    /// Acknowledges a successful unsubscribe.
    Unsubscribed,
    /// A notification was published or replaced.
    Consumed { notification: ActiveNotification },
    /// The same publication, paired with the resulting order.
    ConsumedWithSorting {
        notification: ActiveNotification,
        snapshot: SortingSnapshot,
    },
    /// A notification left the registry.
    Canceled { notification: ActiveNotification },
    /// The same removal, with the resulting order and the recorded reason.
    CanceledWithSorting {
        notification: ActiveNotification,
        snapshot: SortingSnapshot,
        reason: DeleteReason,
    },
    /// A bundle's notifications-enabled switch changed.
    EnabledChanged {
        bundle: BundleIdentity,
        enabled: bool,
    },
    /// A bundle's badge number changed.
    BadgeChanged {
        bundle: BundleIdentity,
        badge_number: u32,
    },
    /// A user's do-not-disturb profile changed.
    DoNotDisturbChanged {
        user_id: i32,
        profile: DoNotDisturbProfile,
    },
}

impl SubscriberEvent {
    /// Stable label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            SubscriberEvent::Subscribed => "subscribed",
            SubscriberEvent::Unsubscribed => "unsubscribed",
            SubscriberEvent::Consumed { .. } => "consumed",
            SubscriberEvent::ConsumedWithSorting { .. } => "consumed-with-sorting",
            SubscriberEvent::Canceled { .. } => "canceled",
            SubscriberEvent::CanceledWithSorting { .. } => "canceled-with-sorting",
            SubscriberEvent::EnabledChanged { .. } => "enabled-changed",
            SubscriberEvent::BadgeChanged { .. } => "badge-changed",
            SubscriberEvent::DoNotDisturbChanged { .. } => "do-not-disturb-changed",
        }
    }

    /// Bundle the event concerns, when it concerns exactly one.
    pub fn bundle_name(&self) -> Option<&str> {
        match self {
            SubscriberEvent::Consumed { notification }
            | SubscriberEvent::ConsumedWithSorting { notification, .. }
            | SubscriberEvent::Canceled { notification }
            | SubscriberEvent::CanceledWithSorting { notification, .. } => {
                Some(notification.bundle().bundle_name())
            }
            SubscriberEvent::EnabledChanged { bundle, .. }
            | SubscriberEvent::BadgeChanged { bundle, .. } => Some(bundle.bundle_name()),
            _ => None,
        }
    }

    /// User the event concerns, when it concerns exactly one.
    pub fn user_id(&self) -> Option<i32> {
        match self {
            SubscriberEvent::Consumed { notification }
            | SubscriberEvent::ConsumedWithSorting { notification, .. }
            | SubscriberEvent::Canceled { notification }
            | SubscriberEvent::CanceledWithSorting { notification, .. } => {
                Some(notification.bundle().user_id())
            }
            SubscriberEvent::EnabledChanged { bundle, .. }
            | SubscriberEvent::BadgeChanged { bundle, .. } => Some(bundle.user_id()),
            SubscriberEvent::DoNotDisturbChanged { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }
}
