//! Per-challenge solver configuration.
//!
//! Issuers bind this solver with a JSON document naming the authoritative
//! servers, the zone they serve, and a reference to the TSIG credentials held
//! in the platform secret store:
//!
//! ```json
//! {
//!   "servers": ["10.0.0.1", "10.0.0.2", "10.0.0.3"],
//!   "zone": "example.com",
//!   "tsigKeyName": "acme-key",
//!   "tsigAlgorithm": "hmac-sha256",
//!   "tsigSecretName": "tsig-secret",
//!   "tsigSecretKey": "secret",
//!   "ttl": 60
//! }
//! ```
//!
//! `tsigAlgorithm`, `tsigSecretKey` and `ttl` are optional with the defaults
//! shown above. Validation reports the first missing required field by name
//! and happens before any secret lookup or network traffic.

use crate::dns::TsigAlgorithm;
use crate::error::Error;
use serde::Deserialize;

pub(crate) const DEFAULT_TTL: u32 = 60;

fn default_algorithm() -> String {
    "hmac-sha256".to_string()
}

fn default_secret_key() -> String {
    "secret".to_string()
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

/// The decoded challenge-solver configuration document.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SolverConfig {
    /// Authoritative servers to update: IP addresses, `ip:port` pairs, or
    /// hostnames (port 53 when unspecified).
    #[serde(default)]
    pub servers: Vec<String>,

    /// The zone all listed servers are authoritative for.
    #[serde(default)]
    pub zone: String,

    /// TSIG key name; must match the key statement on the servers.
    #[serde(default)]
    pub tsig_key_name: String,

    #[serde(default = "default_algorithm")]
    pub tsig_algorithm: String,

    /// Name of the platform secret holding the shared secret.
    #[serde(default)]
    pub tsig_secret_name: String,

    /// Key within that secret whose value is the base64 secret text.
    #[serde(default = "default_secret_key")]
    pub tsig_secret_key: String,

    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

impl SolverConfig {
    /// Decode and validate the opaque config blob carried by a challenge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyConfig`] when the blob is absent or null,
    /// [`Error::InvalidConfig`] when it does not deserialize, and
    /// [`Error::NoServers`]/[`Error::MissingField`] for incomplete documents.
    pub fn from_challenge(raw: Option<&serde_json::Value>) -> Result<Self, Error> {
        let raw = raw
            .filter(|value| !value.is_null())
            .ok_or(Error::EmptyConfig)?;
        let config: SolverConfig = serde_json::from_value(raw.clone())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.servers.is_empty() {
            return Err(Error::NoServers);
        }
        if self.zone.is_empty() {
            return Err(Error::MissingField("zone"));
        }
        if self.tsig_key_name.is_empty() {
            return Err(Error::MissingField("tsigKeyName"));
        }
        if self.tsig_secret_name.is_empty() {
            return Err(Error::MissingField("tsigSecretName"));
        }
        Ok(())
    }

    /// The configured MAC algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAlgorithm`] for identifiers outside the
    /// recognized set.
    pub fn algorithm(&self) -> Result<TsigAlgorithm, Error> {
        TsigAlgorithm::from_name(&self.tsig_algorithm)
            .ok_or_else(|| Error::UnknownAlgorithm(self.tsig_algorithm.clone()))
    }
}
