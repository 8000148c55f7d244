//! Device identifier type.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a device participating in distributed sync.
///
/// The identifier is a non-empty string that must not contain `'|'`, which is
/// reserved as the field delimiter in replicated store keys.
///
/// # Examples
///
/// ```
/// # use herald_core::types::device::DeviceId;
/// # use herald_core::error::CoreError;
/// let device = DeviceId::new("phone-01").unwrap();
/// assert_eq!(device.value(), "phone-01");
///
/// assert!(matches!(DeviceId::new(""), Err(CoreError::InvalidInput(_))));
/// assert!(matches!(DeviceId::new("a|b"), Err(CoreError::InvalidInput(_))));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a new `DeviceId`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` if the value is empty or contains
    /// the `'|'` delimiter.
    pub fn new(value: &str) -> Result<Self, CoreError> {
        if value.is_empty() {
            return Err(CoreError::InvalidInput(
                "DeviceId cannot be empty.".to_string(),
            ));
        }
        if value.contains('|') {
            return Err(CoreError::InvalidInput(format!(
                "DeviceId '{}' contains the reserved delimiter '|'.",
                value
            )));
        }
        Ok(DeviceId(value.to_string()))
    }

    /// Returns the underlying string value of the `DeviceId`.
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<DeviceId> for String {
    fn from(device_id: DeviceId) -> Self {
        device_id.0
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
