//! An in-memory implementation of the [`SecretStore`][super::SecretStore]
//! trait.

use crate::error::Error;
use crate::secret::SecretStore;
use std::collections::HashMap;

/// An in-memory secret store: values keyed by `(namespace, secret name)` and
/// then by key within the secret. Intended for tests and for embedders that
/// resolve their secrets elsewhere.
///
/// No `Debug` implementation is provided; the values are key material.
#[derive(Default, Clone)]
pub struct InMemorySecretStore {
    secrets: HashMap<(String, String), HashMap<String, Vec<u8>>>,
}

impl InMemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key` in the secret `name` within `namespace`.
    pub fn insert(
        &mut self,
        namespace: &str,
        name: &str,
        key: &str,
        value: impl Into<Vec<u8>>,
    ) {
        self.secrets
            .entry((namespace.to_string(), name.to_string()))
            .or_default()
            .insert(key.to_string(), value.into());
    }
}

#[async_trait::async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, namespace: &str, name: &str, key: &str) -> Result<Vec<u8>, Error> {
        let entries = self
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| Error::SecretNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| Error::SecretKeyMissing {
                namespace: namespace.to_string(),
                name: name.to_string(),
                key: key.to_string(),
            })
    }
}
