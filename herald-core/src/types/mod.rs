//! Core identity types shared across the Herald crates.
//!
//! This module defines the fundamental, validated data types used throughout
//! the broker:
//!
//! - [`BundleIdentity`]: identity of a publishing application bundle.
//! - [`DeviceId`]: identifier of a device participating in distributed sync.
//!
//! These types are designed to be simple, with validation at construction so
//! downstream code can rely on their invariants.

pub mod bundle;
pub mod device;

pub use bundle::BundleIdentity;
pub use device::DeviceId;
