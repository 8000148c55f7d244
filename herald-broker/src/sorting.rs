//! Ranking of active notifications into immutable, versioned snapshots.
//!
//! Each registry mutation recomputes the ordering for the affected user
//! scope and publishes a fresh [`SortingSnapshot`]. Snapshots are plain
//! values: subscribers receive them by value together with the triggering
//! event, so a snapshot never changes after it was produced.

use crate::types::{ActiveNotification, Importance, NotificationKey};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};

/// One ranked position inside a [`SortingSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortingEntry {
    pub key: NotificationKey,
    pub rank: usize,
    pub importance: Importance,
}

/// Immutable ranking of a user's active notifications at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortingSnapshot {
    /// Monotonically increasing across recomputes; a larger version is newer.
    pub version: u64,
    pub user_id: i32,
    pub entries: Vec<SortingEntry>,
}

impl SortingSnapshot {
    /// Position of `key` in this snapshot, `None` if it is not ranked.
    pub fn rank_of(&self, key: &NotificationKey) -> Option<usize> {
        self.entries.iter().find(|e| &e.key == key).map(|e| e.rank)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Orders two active notifications for display.
///
/// An explicit sort key overrides everything and ranks ahead of entries
/// without one. Within equal sort keys (or none), higher importance wins,
/// then the more recently updated entry, then the key as a stable tiebreak.
pub(crate) fn compare(a: &ActiveNotification, b: &ActiveNotification) -> CmpOrdering {
    let by_sort_key = match (&a.request.sort_key, &b.request.sort_key) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    };
    by_sort_key
        .then_with(|| b.importance.cmp(&a.importance))
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| a.key.cmp(&b.key))
}

/// Produces versioned [`SortingSnapshot`]s for user scopes.
pub struct SortingEngine {
    version: AtomicU64,
}

impl SortingEngine {
    pub fn new() -> Self {
        Self {
            version: AtomicU64::new(0),
        }
    }

    /// Ranks `items` (all belonging to `user_id`) and stamps the result with
    /// the next snapshot version.
    pub fn recompute(&self, user_id: i32, mut items: Vec<&ActiveNotification>) -> SortingSnapshot {
        items.sort_by(|a, b| compare(a, b));
        let entries = items
            .iter()
            .enumerate()
            .map(|(rank, n)| SortingEntry {
                key: n.key.clone(),
                rank,
                importance: n.importance,
            })
            .collect();
        SortingSnapshot {
            version: self.version.fetch_add(1, Ordering::SeqCst) + 1,
            user_id,
            entries,
        }
    }

    /// Version of the most recently produced snapshot.
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

impl Default for SortingEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        NotificationContent, NotificationFlags, NotificationOrigin, NotificationRequest,
        RemindType, SlotType,
    };
    use chrono::{Duration, Utc};
    use herald_core::types::BundleIdentity;
    use pretty_assertions::assert_eq;

    fn active(
        label: &str,
        importance: Importance,
        sort_key: Option<&str>,
        age_secs: i64,
    ) -> ActiveNotification {
        let bundle = BundleIdentity::new("com.example.mail", 1, 100).unwrap();
        let request = NotificationRequest {
            bundle,
            id: 0,
            label: label.to_string(),
            slot_type: SlotType::Other,
            content: NotificationContent::default(),
            flags: NotificationFlags::default(),
            badge_number: None,
            sort_key: sort_key.map(|s| s.to_string()),
            delivery_time: None,
        };
        ActiveNotification::new(
            request,
            NotificationOrigin::Local,
            RemindType::None,
            importance,
            Utc::now() - Duration::seconds(age_secs),
        )
    }

    fn ranked_labels(snapshot: &SortingSnapshot) -> Vec<String> {
        snapshot
            .entries
            .iter()
            .map(|e| {
                // key format is "{user}_{uid}_{label}_{id}"
                e.key.value().split('_').nth(2).unwrap().to_string()
            })
            .collect()
    }

    #[test]
    fn higher_importance_ranks_first() {
        let engine = SortingEngine::new();
        let low = active("low", Importance::Low, None, 0);
        let high = active("high", Importance::High, None, 0);
        let snapshot = engine.recompute(100, vec![&low, &high]);
        assert_eq!(ranked_labels(&snapshot), vec!["high", "low"]);
    }

    #[test]
    fn newer_update_ranks_first_within_equal_importance() {
        let engine = SortingEngine::new();
        let older = active("older", Importance::Normal, None, 60);
        let newer = active("newer", Importance::Normal, None, 1);
        let snapshot = engine.recompute(100, vec![&older, &newer]);
        assert_eq!(ranked_labels(&snapshot), vec!["newer", "older"]);
    }

    #[test]
    fn sort_key_overrides_importance() {
        let engine = SortingEngine::new();
        let pinned = active("pinned", Importance::Min, Some("00-top"), 120);
        let urgent = active("urgent", Importance::High, None, 0);
        let snapshot = engine.recompute(100, vec![&urgent, &pinned]);
        assert_eq!(ranked_labels(&snapshot), vec!["pinned", "urgent"]);
    }

    #[test]
    fn sort_keys_order_lexicographically() {
        let engine = SortingEngine::new();
        let second = active("second", Importance::Normal, Some("b"), 0);
        let first = active("first", Importance::Normal, Some("a"), 0);
        let snapshot = engine.recompute(100, vec![&second, &first]);
        assert_eq!(ranked_labels(&snapshot), vec!["first", "second"]);
    }

    #[test]
    fn key_breaks_remaining_ties_deterministically() {
        let engine = SortingEngine::new();
        let now = Utc::now();
        let mut a = active("aaa", Importance::Normal, None, 0);
        let mut b = active("bbb", Importance::Normal, None, 0);
        a.updated_at = now;
        b.updated_at = now;

        let forward = engine.recompute(100, vec![&a, &b]);
        let backward = engine.recompute(100, vec![&b, &a]);
        assert_eq!(ranked_labels(&forward), ranked_labels(&backward));
        assert_eq!(ranked_labels(&forward), vec!["aaa", "bbb"]);
    }

    #[test]
    fn versions_increase_monotonically() {
        let engine = SortingEngine::new();
        let item = active("only", Importance::Normal, None, 0);
        let first = engine.recompute(100, vec![&item]);
        let second = engine.recompute(100, vec![&item]);
        let third = engine.recompute(100, vec![]);
        assert!(first.version < second.version);
        assert!(second.version < third.version);
        assert_eq!(engine.current_version(), third.version);
    }

    #[test]
    fn rank_of_reports_position() {
        let engine = SortingEngine::new();
        let low = active("low", Importance::Low, None, 0);
        let high = active("high", Importance::High, None, 0);
        let snapshot = engine.recompute(100, vec![&low, &high]);
        assert_eq!(snapshot.rank_of(&high.key), Some(0));
        assert_eq!(snapshot.rank_of(&low.key), Some(1));
        let absent = active("absent", Importance::Low, None, 0);
        assert_eq!(snapshot.rank_of(&absent.key), None);
    }
}
