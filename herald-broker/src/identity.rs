//! Caller identity and platform policy lookups.
//!
//! The broker never trusts request payloads for authorization decisions; it
//! asks an [`IdentityResolver`] about the resolved caller instead. Production
//! wires a platform-backed resolver, tests use [`StaticIdentityResolver`].

use async_trait::async_trait;
use herald_core::types::BundleIdentity;
use std::collections::HashSet;

/// The resolved identity of the party issuing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub bundle: BundleIdentity,
}

impl CallerContext {
    pub fn new(bundle: BundleIdentity) -> Self {
        Self { bundle }
    }

    /// Whether the caller owns notifications and preferences of `bundle`.
    pub fn owns(&self, bundle: &BundleIdentity) -> bool {
        &self.bundle == bundle
    }
}

/// Answers identity questions the broker cannot derive from a request alone.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Initial `notifications_enabled` value for a bundle's first preference
    /// write, from the platform's API compatibility check.
    async fn default_notifications_enabled(&self, bundle: &BundleIdentity) -> bool;

    /// Whether the caller may act on notifications it does not own.
    async fn is_privileged(&self, caller: &CallerContext) -> bool;
}

/// Resolver with a fixed answer set.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityResolver {
    privileged_uids: HashSet<i32>,
    enabled_by_default: bool,
}

impl StaticIdentityResolver {
    pub fn new(enabled_by_default: bool) -> Self {
        Self {
            privileged_uids: HashSet::new(),
            enabled_by_default,
        }
    }

    /// Marks `uid` as privileged for cross-bundle operations.
    pub fn with_privileged(mut self, uid: i32) -> Self {
        self.privileged_uids.insert(uid);
        self
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn default_notifications_enabled(&self, _bundle: &BundleIdentity) -> bool {
        self.enabled_by_default
    }

    async fn is_privileged(&self, caller: &CallerContext) -> bool {
        self.privileged_uids.contains(&caller.bundle.uid())
    }
}
