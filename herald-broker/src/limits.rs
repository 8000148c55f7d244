//! Fixed capacity and admission limits enforced by the broker.

use std::time::Duration;

/// Maximum number of active notifications across all bundles and users.
pub const MAX_ACTIVE_TOTAL: usize = 1000;

/// Maximum number of active notifications a single bundle may hold.
pub const MAX_ACTIVE_PER_BUNDLE: usize = 100;

/// Maximum notifications admitted per rolling window, both globally and per
/// bundle.
pub const MAX_ACTIVE_PER_SECOND: usize = 10;

/// Length of the rolling admission window.
pub const FLOW_WINDOW: Duration = Duration::from_secs(1);

/// Maximum number of slots a bundle may register.
pub const MAX_SLOTS_PER_BUNDLE: usize = 5;

/// Maximum number of slot groups a bundle may register.
pub const MAX_SLOT_GROUPS_PER_BUNDLE: usize = 4;

/// Slot descriptions longer than this are truncated on write.
pub const MAX_DESCRIPTION_LEN: usize = 1000;

/// Maximum declared icon payload size in bytes.
pub const MAX_ICON_BYTES: u64 = 50 * 1024;

/// Maximum declared picture payload size in bytes.
pub const MAX_PICTURE_BYTES: u64 = 2 * 1024 * 1024;

/// Maximum number of concurrently registered subscribers.
pub const MAX_SUBSCRIBERS: usize = 64;

/// Depth of each subscriber's delivery queue.
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 128;

/// Default capacity of the recent-history ring.
pub const DEFAULT_RECENT_CAPACITY: usize = 16;

/// Attempts made when writing an entry to the replicated store.
pub const MIRROR_RETRY_ATTEMPTS: usize = 3;
