//! Persistence interface for the preference state.
//!
//! The store talks to a [`PreferencesPersistenceProvider`] rather than the
//! key-value layer directly, so tests can substitute a mock and the durable
//! format stays an implementation detail of the provider.

use super::types::PreferencesState;
use crate::error::BrokerError;
use async_trait::async_trait;
use herald_core::storage::KeyValueStore;
use std::sync::Arc;
use tracing::debug;

/// Loads and saves the full preference state.
///
/// `save` must not return before the state is durable; the store commits its
/// in-memory copy only after `save` succeeds.
#[async_trait]
pub trait PreferencesPersistenceProvider: Send + Sync {
    async fn load(&self) -> Result<PreferencesState, BrokerError>;
    async fn save(&self, state: &PreferencesState) -> Result<(), BrokerError>;
}

/// Record key under which the whole state is stored.
const PREFERENCES_RECORD_KEY: &str = "preferences";

/// Provider that keeps the state as one TOML record in a [`KeyValueStore`].
pub struct KeyValuePreferencesProvider {
    store: Arc<dyn KeyValueStore>,
}

impl KeyValuePreferencesProvider {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PreferencesPersistenceProvider for KeyValuePreferencesProvider {
    async fn load(&self) -> Result<PreferencesState, BrokerError> {
        let record = self
            .store
            .get(PREFERENCES_RECORD_KEY)
            .await
            .map_err(|e| {
                BrokerError::persistence("load preferences", "Could not read record", e)
            })?;
        match record {
            Some(text) => {
                let state = toml::from_str(&text).map_err(|e| BrokerError::Persistence {
                    operation: "load preferences".to_string(),
                    message: format!("Record is not valid TOML: {}", e),
                    source: None,
                })?;
                Ok(state)
            }
            None => {
                debug!("No stored preferences record, starting from defaults.");
                Ok(PreferencesState::default())
            }
        }
    }

    async fn save(&self, state: &PreferencesState) -> Result<(), BrokerError> {
        let serialized =
            toml::to_string_pretty(state).map_err(|e| BrokerError::Persistence {
                operation: "save preferences".to_string(),
                message: format!("State could not be serialized: {}", e),
                source: None,
            })?;
        self.store
            .put(PREFERENCES_RECORD_KEY, &serialized)
            .await
            .map_err(|e| {
                BrokerError::persistence("save preferences", "Could not write record", e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::preferences::types::BundleEntry;
    use crate::types::SlotType;
    use herald_core::storage::MemoryKeyValueStore;
    use herald_core::types::BundleIdentity;
    use herald_core::CoreError;
    use mockall::mock;
    use pretty_assertions::assert_eq;

    mock! {
        Store {}

        #[async_trait]
        impl KeyValueStore for Store {
            async fn get(&self, key: &str) -> Result<Option<String>, CoreError>;
            async fn put(&self, key: &str, value: &str) -> Result<(), CoreError>;
            async fn remove(&self, key: &str) -> Result<(), CoreError>;
            async fn keys(&self) -> Result<Vec<String>, CoreError>;
        }
    }

    fn sample_state() -> PreferencesState {
        let bundle = BundleIdentity::new("com.example.mail", 42, 100).unwrap();
        let mut entry = BundleEntry::new(bundle.clone(), true);
        entry
            .slots
            .push(crate::preferences::types::Slot::new(SlotType::ServiceReminder));
        let mut state = PreferencesState::default();
        state.bundles.insert(bundle.storage_key(), entry);
        state
    }

    #[tokio::test]
    async fn load_returns_defaults_when_record_missing() {
        let provider = KeyValuePreferencesProvider::new(Arc::new(MemoryKeyValueStore::new()));
        let state = provider.load().await.unwrap();
        assert_eq!(state, PreferencesState::default());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let provider = KeyValuePreferencesProvider::new(Arc::new(MemoryKeyValueStore::new()));
        let state = sample_state();
        provider.save(&state).await.unwrap();
        let reloaded = provider.load().await.unwrap();
        assert_eq!(reloaded, state);
    }

    #[tokio::test]
    async fn load_rejects_corrupt_record() {
        let store = MemoryKeyValueStore::new();
        store
            .put(PREFERENCES_RECORD_KEY, "this is [not] = valid = toml")
            .await
            .unwrap();
        let provider = KeyValuePreferencesProvider::new(Arc::new(store));
        let err = provider.load().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[tokio::test]
    async fn load_propagates_store_failure() {
        let mut store = MockStore::new();
        store.expect_get().times(1).returning(|_| {
            Err(CoreError::Internal("backend unavailable".to_string()))
        });
        let provider = KeyValuePreferencesProvider::new(Arc::new(store));
        let err = provider.load().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[tokio::test]
    async fn save_propagates_store_failure() {
        let mut store = MockStore::new();
        store.expect_put().times(1).returning(|_, _| {
            Err(CoreError::Internal("backend unavailable".to_string()))
        });
        let provider = KeyValuePreferencesProvider::new(Arc::new(store));
        let err = provider.save(&sample_state()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }
}
