//! # Herald Broker Library (`herald-broker`)
//!
//! `herald-broker` is the domain layer of Herald, a device-local notification
//! broker. It keeps the table of active notifications, enforces publishing
//! policy, fans events out to subscribers, and optionally mirrors eligible
//! notifications to paired devices.
//!
//! ## Components
//!
//! - **Registry** ([`NotificationRegistry`]): the active-notification table.
//!   Publishing, replacement by key, removal, recency archive, and the
//!   versioned sorting snapshot recomputed after every mutation.
//! - **Preferences** ([`PreferencesStore`]): durable per-bundle slots, slot
//!   groups, bundle properties, and per-user do-not-disturb profiles. Writes
//!   commit to storage before they become visible in memory.
//! - **Flow control** ([`FlowController`]): rolling per-second publish
//!   windows and absolute active-count ceilings.
//! - **Dispatch** ([`SubscriberDispatcher`]): the subscriber table with
//!   per-subscriber bounded queues and per-subscriber delivery order.
//! - **Distributed sync** ([`DistributedSync`]): best-effort mirroring of
//!   eligible notifications through a replicated key-value store, plus the
//!   cross-device screen state that drives [`RemindType`].
//! - **Facade** ([`NotificationBroker`]): authorization and wiring; the one
//!   entry point transports talk to, via [`commands::handle`] or directly.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use herald_broker::{NotificationBroker, commands};
//! use herald_broker::preferences::KeyValuePreferencesProvider;
//!
//! let broker = NotificationBroker::bootstrap(
//!     &config,
//!     Arc::new(KeyValuePreferencesProvider::new(store)),
//!     None,
//!     identity,
//! )
//! .await?;
//! let response = commands::dispatch(&broker, &caller, request).await;
//! ```

pub mod broker;
pub mod commands;
pub mod dispatch;
pub mod distributed;
pub mod error;
pub mod events;
pub mod flow_control;
pub mod identity;
pub mod limits;
pub mod preferences;
pub mod registry;
pub mod sorting;
pub mod types;

// Re-export key types for convenience
pub use broker::NotificationBroker;
pub use commands::{BrokerRequest, BrokerResponse};
pub use dispatch::{
    NotificationSubscriber, SubscriberDispatcher, SubscriberFilter, SubscriberGone,
    SubscriberHandle,
};
pub use distributed::store::{DistributedKey, MemoryReplicatedStore, RemoteChange, ReplicatedStore};
pub use distributed::DistributedSync;
pub use error::{BrokerError, ErrorKind};
pub use events::SubscriberEvent;
pub use flow_control::FlowController;
pub use identity::{CallerContext, IdentityResolver, StaticIdentityResolver};
pub use preferences::{
    BundlePropertyKind, BundlePropertyValue, DoNotDisturbProfile, DoNotDisturbType,
    KeyValuePreferencesProvider, LockscreenVisibility, PreferencesPersistenceProvider,
    PreferencesStore, Slot, SlotGroup,
};
pub use registry::NotificationRegistry;
pub use sorting::{SortingEntry, SortingSnapshot};
pub use types::{
    ActiveNotification, ContentKind, DeleteReason, Importance, NotificationContent,
    NotificationFlags, NotificationKey, NotificationOrigin, NotificationRequest, RemindType,
    ScreenState, SlotType,
};
