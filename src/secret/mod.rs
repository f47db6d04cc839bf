//! Read-only access to secrets held by the orchestration platform.
//!
//! The solver never talks to the platform API itself; it is handed a
//! [`SecretStore`] during initialization and looks up exactly one value per
//! mutation: the base64 text of the TSIG shared secret, addressed by
//! `(namespace, secret name, key)`. The error taxonomy distinguishes a
//! missing secret from a secret missing the requested key, so operators can
//! tell a misnamed secret from a misnamed field.
//!
//! [`memory::InMemorySecretStore`] is provided for embedding and tests.

use crate::error::Error;
use std::sync::Arc;

pub mod memory;

#[allow(clippy::module_name_repetitions)]
pub use memory::InMemorySecretStore;

/// `DynSecretStore` is a type alias for a shared [`SecretStore`] handle as
/// installed into the solver during initialization.
#[allow(clippy::module_name_repetitions)]
pub type DynSecretStore = Arc<dyn SecretStore + Send + Sync>;

/// An async trait describing a read-only lookup of one key from a named
/// secret in a namespace.
#[async_trait::async_trait]
pub trait SecretStore {
    /// Fetch the value at `key` in the secret `name` within `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SecretNotFound`] when no such secret exists, and
    /// [`Error::SecretKeyMissing`] when the secret lacks the key.
    async fn get(&self, namespace: &str, name: &str, key: &str) -> Result<Vec<u8>, Error>;
}
