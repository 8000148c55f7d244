//! Admission control for local publishes.
//!
//! Keeps a global and a per-bundle 1-second rolling window plus the absolute
//! active-notification ceilings. Only net-new keys published locally pass
//! through here; replacements, removals, and remote-origin entries bypass
//! admission.

use crate::error::BrokerError;
use crate::limits::{
    FLOW_WINDOW, MAX_ACTIVE_PER_BUNDLE, MAX_ACTIVE_PER_SECOND, MAX_ACTIVE_TOTAL,
};
use herald_core::types::BundleIdentity;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Instant;
use tracing::warn;

#[derive(Debug, Default)]
struct FlowWindows {
    global: VecDeque<Instant>,
    per_bundle: HashMap<String, VecDeque<Instant>>,
}

impl FlowWindows {
    fn prune(window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= FLOW_WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Admission gate shared by all publishers.
#[derive(Debug, Default)]
pub struct FlowController {
    inner: Mutex<FlowWindows>,
}

impl FlowController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits one net-new publish for `bundle`, or explains why not.
    ///
    /// `bundle_active` and `total_active` are the registry's current counts;
    /// the rolling windows are the controller's own state. The publish is
    /// recorded in both windows only when every ceiling holds, so rejected
    /// attempts do not consume budget.
    pub fn try_admit(
        &self,
        bundle: &BundleIdentity,
        bundle_active: usize,
        total_active: usize,
        now: Instant,
    ) -> Result<(), BrokerError> {
        if total_active >= MAX_ACTIVE_TOTAL {
            return Err(BrokerError::OverMaxActiveTotal {
                limit: MAX_ACTIVE_TOTAL,
            });
        }
        if bundle_active >= MAX_ACTIVE_PER_BUNDLE {
            return Err(BrokerError::OverMaxActivePerBundle {
                bundle_name: bundle.bundle_name().to_string(),
                limit: MAX_ACTIVE_PER_BUNDLE,
            });
        }

        let mut windows = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        FlowWindows::prune(&mut windows.global, now);
        if windows.global.len() >= MAX_ACTIVE_PER_SECOND {
            warn!(bundle = %bundle, "Global publish rate limit hit.");
            return Err(BrokerError::OverMaxActivePerSecond {
                bundle_name: bundle.bundle_name().to_string(),
            });
        }
        let bundle_window = windows
            .per_bundle
            .entry(bundle.storage_key())
            .or_default();
        FlowWindows::prune(bundle_window, now);
        if bundle_window.len() >= MAX_ACTIVE_PER_SECOND {
            warn!(bundle = %bundle, "Publish rate limit hit for bundle.");
            return Err(BrokerError::OverMaxActivePerSecond {
                bundle_name: bundle.bundle_name().to_string(),
            });
        }
        bundle_window.push_back(now);
        windows.global.push_back(now);
        Ok(())
    }

    /// Drops the bundle's window. Used when a bundle is purged so a
    /// reinstalled bundle starts with fresh budget.
    pub fn forget_bundle(&self, bundle: &BundleIdentity) {
        let mut windows = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        windows.per_bundle.remove(&bundle.storage_key());
    }
}
