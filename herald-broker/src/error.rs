//! Broker error taxonomy.
//!
//! Every fallible broker operation returns [`BrokerError`]. The display
//! strings are stable so UI layers can surface them directly; transport
//! layers that only need a coarse result code use [`BrokerError::kind`].

use crate::types::{NotificationKey, SlotType};
use herald_core::error::CoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a [`BrokerError`] for transport result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    InvalidParam,
    NotAllowed,
    NotFound,
    ResourceExceeded,
    Unremovable,
    Persistence,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Operation not allowed: {0}")]
    NotAllowed(String),

    #[error("Bundle '{bundle_name}' does not exist.")]
    BundleNotExist { bundle_name: String },

    #[error("Slot of type '{slot_type}' does not exist.")]
    SlotTypeNotExist { slot_type: SlotType },

    #[error("Slot group '{group_id}' does not exist.")]
    SlotGroupNotExist { group_id: String },

    #[error("Slot group id '{group_id}' is invalid.")]
    SlotGroupIdInvalid { group_id: String },

    #[error("No active notification with key '{key}'.")]
    NotificationNotExists { key: NotificationKey },

    #[error("Caller is not subscribed.")]
    NotSubscribed,

    #[error("Bundle '{bundle_name}' exceeded the per-second publish limit.")]
    OverMaxActivePerSecond { bundle_name: String },

    #[error("Bundle '{bundle_name}' reached its active-notification limit of {limit}.")]
    OverMaxActivePerBundle { bundle_name: String, limit: usize },

    #[error("The broker reached its total active-notification limit of {limit}.")]
    OverMaxActiveTotal { limit: usize },

    #[error("Bundle '{bundle_name}' reached its slot limit of {limit}.")]
    SlotExceedsMax { bundle_name: String, limit: usize },

    #[error("Bundle '{bundle_name}' reached its slot-group limit of {limit}.")]
    SlotGroupExceedsMax { bundle_name: String, limit: usize },

    #[error("Declared {content} size of {size} bytes exceeds the cap of {limit} bytes.")]
    ContentOversize {
        content: &'static str,
        size: u64,
        limit: u64,
    },

    #[error("Subscriber table is full ({limit} subscribers).")]
    SubscriberTableFull { limit: usize },

    #[error("Notification '{key}' is unremovable.")]
    Unremovable { key: NotificationKey },

    #[error("Persistence failure during operation '{operation}': {message}")]
    Persistence {
        operation: String,
        message: String,
        #[source]
        source: Option<CoreError>,
    },
}

impl BrokerError {
    /// Maps the error to its coarse [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::InvalidParam(_) | BrokerError::SlotGroupIdInvalid { .. } => {
                ErrorKind::InvalidParam
            }
            BrokerError::NotAllowed(_) => ErrorKind::NotAllowed,
            BrokerError::BundleNotExist { .. }
            | BrokerError::SlotTypeNotExist { .. }
            | BrokerError::SlotGroupNotExist { .. }
            | BrokerError::NotificationNotExists { .. }
            | BrokerError::NotSubscribed => ErrorKind::NotFound,
            BrokerError::OverMaxActivePerSecond { .. }
            | BrokerError::OverMaxActivePerBundle { .. }
            | BrokerError::OverMaxActiveTotal { .. }
            | BrokerError::SlotExceedsMax { .. }
            | BrokerError::SlotGroupExceedsMax { .. }
            | BrokerError::ContentOversize { .. }
            | BrokerError::SubscriberTableFull { .. } => ErrorKind::ResourceExceeded,
            BrokerError::Unremovable { .. } => ErrorKind::Unremovable,
            BrokerError::Persistence { .. } => ErrorKind::Persistence,
        }
    }

    /// Wraps a storage failure into the persistence variant.
    pub fn persistence(operation: &str, message: impl Into<String>, source: CoreError) -> Self {
        BrokerError::Persistence {
            operation: operation.to_string(),
            message: message.into(),
            source: Some(source),
        }
    }
}

impl From<CoreError> for BrokerError {
    fn from(e: CoreError) -> Self {
        BrokerError::Persistence {
            operation: "storage".to_string(),
            message: e.to_string(),
            source: Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NotificationKey;
    use herald_core::types::BundleIdentity;
    use std::error::Error as _;

    fn sample_key() -> NotificationKey {
        let bundle = BundleIdentity::new("com.example.mail", 42, 100).unwrap();
        NotificationKey::of(&bundle, "inbox", 1)
    }

    #[test]
    fn display_strings_are_stable() {
        assert_eq!(
            BrokerError::InvalidParam("label too long".to_string()).to_string(),
            "Invalid parameter: label too long"
        );
        assert_eq!(
            BrokerError::BundleNotExist {
                bundle_name: "com.example.mail".to_string()
            }
            .to_string(),
            "Bundle 'com.example.mail' does not exist."
        );
        assert_eq!(
            BrokerError::OverMaxActiveTotal { limit: 1000 }.to_string(),
            "The broker reached its total active-notification limit of 1000."
        );
        assert_eq!(
            BrokerError::Unremovable { key: sample_key() }.to_string(),
            "Notification '100_42_inbox_1' is unremovable."
        );
        assert_eq!(
            BrokerError::ContentOversize {
                content: "icon",
                size: 60_000,
                limit: 51_200
            }
            .to_string(),
            "Declared icon size of 60000 bytes exceeds the cap of 51200 bytes."
        );
    }

    #[test]
    fn kind_mapping_is_coarse() {
        assert_eq!(
            BrokerError::InvalidParam("x".to_string()).kind(),
            ErrorKind::InvalidParam
        );
        assert_eq!(
            BrokerError::NotAllowed("x".to_string()).kind(),
            ErrorKind::NotAllowed
        );
        assert_eq!(
            BrokerError::BundleNotExist {
                bundle_name: "b".to_string()
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(BrokerError::NotSubscribed.kind(), ErrorKind::NotFound);
        assert_eq!(
            BrokerError::OverMaxActivePerSecond {
                bundle_name: "b".to_string()
            }
            .kind(),
            ErrorKind::ResourceExceeded
        );
        assert_eq!(
            BrokerError::SubscriberTableFull { limit: 64 }.kind(),
            ErrorKind::ResourceExceeded
        );
        assert_eq!(
            BrokerError::ContentOversize {
                content: "icon",
                size: 60_000,
                limit: 51_200
            }
            .kind(),
            ErrorKind::ResourceExceeded
        );
        assert_eq!(
            BrokerError::Unremovable { key: sample_key() }.kind(),
            ErrorKind::Unremovable
        );
        assert_eq!(
            BrokerError::Persistence {
                operation: "save".to_string(),
                message: "disk full".to_string(),
                source: None
            }
            .kind(),
            ErrorKind::Persistence
        );
    }

    #[test]
    fn from_core_error_maps_to_persistence_with_source() {
        let core = CoreError::InvalidInput("broken".to_string());
        let err: BrokerError = core.into();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(err.source().is_some());
    }

    #[test]
    fn persistence_helper_carries_operation() {
        let core = CoreError::Internal("oops".to_string());
        let err = BrokerError::persistence("save", "could not write record", core);
        match err {
            BrokerError::Persistence {
                operation,
                message,
                source,
            } => {
                assert_eq!(operation, "save");
                assert_eq!(message, "could not write record");
                assert!(source.is_some());
            }
            other => panic!("Unexpected variant: {:?}", other),
        }
    }
}
