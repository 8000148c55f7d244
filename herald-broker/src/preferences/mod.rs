//! Bundle-scoped notification preferences.
//!
//! [`PreferencesStore`] is the only writer of durable policy: slots, slot
//! groups, per-bundle properties, and do-not-disturb profiles. It is handed
//! to the components that consult policy; nothing reaches the persisted
//! state except through it.

pub mod persistence;
pub mod service;
pub mod types;

pub use persistence::{KeyValuePreferencesProvider, PreferencesPersistenceProvider};
pub use service::PreferencesStore;
pub use types::{
    BundleEntry, BundleProperties, BundlePropertyKind, BundlePropertyValue, DoNotDisturbProfile,
    DoNotDisturbType, LockscreenVisibility, PreferencesState, Slot, SlotGroup,
};
