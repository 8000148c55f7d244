//! Publisher bundle identity type.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a publishing application bundle.
///
/// A bundle is identified by its name together with the numeric install `uid`
/// and the `user_id` of the account it runs under. Two installs of the same
/// bundle name under different uids are distinct publishers with separate
/// preferences and notifications. The name is a non-empty string that must
/// not contain `'|'`, which is reserved as the field delimiter in replicated
/// store keys.
///
/// # Examples
///
/// ```
/// # use herald_core::types::bundle::BundleIdentity;
/// # use herald_core::error::CoreError;
/// let bundle = BundleIdentity::new("com.example.mail", 20010043, 100).unwrap();
/// assert_eq!(bundle.bundle_name(), "com.example.mail");
/// assert_eq!(bundle.storage_key(), "com.example.mail_20010043");
///
/// assert!(matches!(
///     BundleIdentity::new("", 1, 100),
///     Err(CoreError::InvalidInput(_))
/// ));
/// assert!(matches!(
///     BundleIdentity::new("com|example", 1, 100),
///     Err(CoreError::InvalidInput(_))
/// ));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleIdentity {
    bundle_name: String,
    uid: i32,
    user_id: i32,
}

impl BundleIdentity {
    /// Creates a new `BundleIdentity`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` if the bundle name is empty or
    /// contains the `'|'` delimiter.
    pub fn new(bundle_name: &str, uid: i32, user_id: i32) -> Result<Self, CoreError> {
        if bundle_name.is_empty() {
            return Err(CoreError::InvalidInput(
                "Bundle name cannot be empty.".to_string(),
            ));
        }
        if bundle_name.contains('|') {
            return Err(CoreError::InvalidInput(format!(
                "Bundle name '{}' contains the reserved delimiter '|'.",
                bundle_name
            )));
        }
        Ok(BundleIdentity {
            bundle_name: bundle_name.to_string(),
            uid,
            user_id,
        })
    }

    /// Returns the bundle name.
    pub fn bundle_name(&self) -> &str {
        &self.bundle_name
    }

    /// Returns the install uid.
    pub fn uid(&self) -> i32 {
        self.uid
    }

    /// Returns the owning user account id.
    pub fn user_id(&self) -> i32 {
        self.user_id
    }

    /// Returns the key under which this bundle's preferences are scoped,
    /// `"{bundle_name}_{uid}"`.
    pub fn storage_key(&self) -> String {
        format!("{}_{}", self.bundle_name, self.uid)
    }
}

impl fmt::Display for BundleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.bundle_name, self.uid)
    }
}
