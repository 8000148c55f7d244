//! Wire-level request and response shapes.
//!
//! Transports (IPC endpoints, test drivers) hand the broker a
//! [`BrokerRequest`] and get a [`BrokerResponse`] back. The request set is a
//! closed enum and [`handle`] matches it exhaustively, so a new operation
//! cannot be forgotten by a transport without a compile error. Subscribing is
//! not representable here: subscribers are live callback objects and attach
//! through [`NotificationBroker::subscribe`] directly.

use crate::broker::NotificationBroker;
use crate::error::{BrokerError, ErrorKind};
use crate::identity::CallerContext;
use crate::preferences::{
    BundlePropertyKind, BundlePropertyValue, DoNotDisturbProfile, Slot, SlotGroup,
};
use crate::types::{ActiveNotification, NotificationKey, NotificationRequest, SlotType};
use herald_core::types::BundleIdentity;
use serde::{Deserialize, Serialize};

/// Everything a transport can ask the broker to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum BrokerRequest {
    Publish {
        request: NotificationRequest,
    },
    Cancel {
        id: i32,
        label: String,
    },
    CancelAll,
    Remove {
        key: NotificationKey,
    },
    RemoveAllForBundle {
        bundle: BundleIdentity,
    },
    RemoveAll {
        user_id: i32,
    },
    Get {
        key: NotificationKey,
    },
    GetActive,
    GetActiveForUser {
        user_id: i32,
    },
    GetActiveCount,
    GetTotalCount,
    AddSlot {
        bundle: BundleIdentity,
        slot: Slot,
    },
    AddSlots {
        bundle: BundleIdentity,
        slots: Vec<Slot>,
    },
    UpdateSlot {
        bundle: BundleIdentity,
        slot: Slot,
    },
    RemoveSlot {
        bundle: BundleIdentity,
        slot_type: SlotType,
    },
    RemoveAllSlots {
        bundle: BundleIdentity,
    },
    GetSlot {
        bundle: BundleIdentity,
        slot_type: SlotType,
    },
    GetSlots {
        bundle: BundleIdentity,
    },
    AddSlotGroups {
        bundle: BundleIdentity,
        groups: Vec<SlotGroup>,
    },
    UpdateSlotGroup {
        bundle: BundleIdentity,
        group: SlotGroup,
    },
    RemoveSlotGroup {
        bundle: BundleIdentity,
        group_id: String,
    },
    GetSlotGroup {
        bundle: BundleIdentity,
        group_id: String,
    },
    GetSlotGroups {
        bundle: BundleIdentity,
    },
    GetSlotsInGroup {
        bundle: BundleIdentity,
        group_id: String,
    },
    GetProperty {
        bundle: BundleIdentity,
        kind: BundlePropertyKind,
    },
    SetProperty {
        bundle: BundleIdentity,
        kind: BundlePropertyKind,
        value: BundlePropertyValue,
    },
    GetDoNotDisturb {
        user_id: i32,
    },
    SetDoNotDisturb {
        user_id: i32,
        profile: DoNotDisturbProfile,
    },
    GetDoNotDisturbActive {
        user_id: i32,
    },
    PurgeBundle {
        bundle: BundleIdentity,
    },
    GetRecent,
    SetRecentCapacity {
        capacity: usize,
    },
    SetScreenStatus {
        on: bool,
    },
}

/// The broker's answer to a [`BrokerRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum BrokerResponse {
    Ack,
    Key { key: NotificationKey },
    Removed { count: usize },
    Slot { slot: Slot },
    Slots { slots: Vec<Slot> },
    SlotGroup { group: SlotGroup },
    SlotGroups { groups: Vec<SlotGroup> },
    Property { value: BundlePropertyValue },
    DoNotDisturb { profile: DoNotDisturbProfile },
    Notification { notification: Option<ActiveNotification> },
    Active { notifications: Vec<ActiveNotification> },
    Count { count: usize },
    Flag { value: bool },
    Error { kind: ErrorKind, message: String },
}

/// Routes one request to the broker operation it names.
pub async fn handle(
    broker: &NotificationBroker,
    caller: &CallerContext,
    request: BrokerRequest,
) -> Result<BrokerResponse, BrokerError> {
    match request {
        BrokerRequest::Publish { request } => {
            let key = broker.publish(caller, request).await?;
            Ok(BrokerResponse::Key { key })
        }
        BrokerRequest::Cancel { id, label } => {
            broker.cancel(caller, id, &label).await?;
            Ok(BrokerResponse::Ack)
        }
        BrokerRequest::CancelAll => {
            let count = broker.cancel_all(caller).await?;
            Ok(BrokerResponse::Removed { count })
        }
        BrokerRequest::Remove { key } => {
            broker.remove(caller, &key).await?;
            Ok(BrokerResponse::Ack)
        }
        BrokerRequest::RemoveAllForBundle { bundle } => {
            let count = broker.remove_all_for_bundle(caller, &bundle).await?;
            Ok(BrokerResponse::Removed { count })
        }
        BrokerRequest::RemoveAll { user_id } => {
            let count = broker.remove_all(caller, user_id).await?;
            Ok(BrokerResponse::Removed { count })
        }
        BrokerRequest::Get { key } => Ok(BrokerResponse::Notification {
            notification: broker.get(caller, &key).await,
        }),
        BrokerRequest::GetActive => Ok(BrokerResponse::Active {
            notifications: broker.active_for_caller(caller).await,
        }),
        BrokerRequest::GetActiveForUser { user_id } => Ok(BrokerResponse::Active {
            notifications: broker.active_for_user(caller, user_id).await?,
        }),
        BrokerRequest::GetActiveCount => Ok(BrokerResponse::Count {
            count: broker.count_for_caller(caller).await,
        }),
        BrokerRequest::GetTotalCount => Ok(BrokerResponse::Count {
            count: broker.total_count(caller).await?,
        }),
        BrokerRequest::AddSlot { bundle, slot } => {
            broker.add_slot(caller, &bundle, slot).await?;
            Ok(BrokerResponse::Ack)
        }
        BrokerRequest::AddSlots { bundle, slots } => {
            broker.add_slots(caller, &bundle, slots).await?;
            Ok(BrokerResponse::Ack)
        }
        BrokerRequest::UpdateSlot { bundle, slot } => {
            broker.update_slot(caller, &bundle, slot).await?;
            Ok(BrokerResponse::Ack)
        }
        BrokerRequest::RemoveSlot { bundle, slot_type } => {
            broker.remove_slot(caller, &bundle, slot_type).await?;
            Ok(BrokerResponse::Ack)
        }
        BrokerRequest::RemoveAllSlots { bundle } => {
            broker.remove_all_slots(caller, &bundle).await?;
            Ok(BrokerResponse::Ack)
        }
        BrokerRequest::GetSlot { bundle, slot_type } => Ok(BrokerResponse::Slot {
            slot: broker.slot(caller, &bundle, slot_type).await?,
        }),
        BrokerRequest::GetSlots { bundle } => Ok(BrokerResponse::Slots {
            slots: broker.slots(caller, &bundle).await?,
        }),
        BrokerRequest::AddSlotGroups { bundle, groups } => {
            broker.add_slot_groups(caller, &bundle, groups).await?;
            Ok(BrokerResponse::Ack)
        }
        BrokerRequest::UpdateSlotGroup { bundle, group } => {
            broker.update_slot_group(caller, &bundle, group).await?;
            Ok(BrokerResponse::Ack)
        }
        BrokerRequest::RemoveSlotGroup { bundle, group_id } => {
            broker.remove_slot_group(caller, &bundle, &group_id).await?;
            Ok(BrokerResponse::Ack)
        }
        BrokerRequest::GetSlotGroup { bundle, group_id } => Ok(BrokerResponse::SlotGroup {
            group: broker.slot_group(caller, &bundle, &group_id).await?,
        }),
        BrokerRequest::GetSlotGroups { bundle } => Ok(BrokerResponse::SlotGroups {
            groups: broker.slot_groups(caller, &bundle).await?,
        }),
        BrokerRequest::GetSlotsInGroup { bundle, group_id } => Ok(BrokerResponse::Slots {
            slots: broker.slots_in_group(caller, &bundle, &group_id).await?,
        }),
        BrokerRequest::GetProperty { bundle, kind } => Ok(BrokerResponse::Property {
            value: broker.property(caller, &bundle, kind).await?,
        }),
        BrokerRequest::SetProperty {
            bundle,
            kind,
            value,
        } => {
            broker.set_property(caller, &bundle, kind, value).await?;
            Ok(BrokerResponse::Ack)
        }
        BrokerRequest::GetDoNotDisturb { user_id } => Ok(BrokerResponse::DoNotDisturb {
            profile: broker.dnd_profile(caller, user_id).await?,
        }),
        BrokerRequest::SetDoNotDisturb { user_id, profile } => {
            broker.set_dnd_profile(caller, user_id, profile).await?;
            Ok(BrokerResponse::Ack)
        }
        BrokerRequest::GetDoNotDisturbActive { user_id } => Ok(BrokerResponse::Flag {
            value: broker.is_dnd_active(caller, user_id).await?,
        }),
        BrokerRequest::PurgeBundle { bundle } => {
            broker.purge_bundle(caller, &bundle).await?;
            Ok(BrokerResponse::Ack)
        }
        BrokerRequest::GetRecent => Ok(BrokerResponse::Active {
            notifications: broker.recent(caller).await?,
        }),
        BrokerRequest::SetRecentCapacity { capacity } => {
            broker.set_recent_capacity(caller, capacity).await?;
            Ok(BrokerResponse::Ack)
        }
        BrokerRequest::SetScreenStatus { on } => {
            broker.set_screen_on(caller, on).await?;
            Ok(BrokerResponse::Ack)
        }
    }
}

/// Like [`handle`], but folds failures into [`BrokerResponse::Error`] so a
/// transport always has something to send back.
pub async fn dispatch(
    broker: &NotificationBroker,
    caller: &CallerContext,
    request: BrokerRequest,
) -> BrokerResponse {
    match handle(broker, caller, request).await {
        Ok(response) => response,
        Err(e) => BrokerResponse::Error {
            kind: e.kind(),
            message: e.to_string(),
        },
    }
}
