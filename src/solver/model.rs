use serde::Deserialize;
use std::fmt;

/// One DNS-01 challenge as delivered by the certificate-management
/// controller.
#[derive(Deserialize, Clone)]
pub struct ChallengeRequest {
    /// The record to mutate, in FQDN form, e.g.
    /// `_acme-challenge.app.example.com.`.
    #[serde(rename = "resolvedFQDN")]
    pub resolved_fqdn: String,

    /// The key authorization to publish as the TXT value. Cleanup requests
    /// may omit it; the whole TXT RRset is withdrawn regardless of value.
    #[serde(default)]
    pub key: String,

    /// Namespace in which the TSIG secret is looked up.
    #[serde(rename = "resourceNamespace")]
    pub resource_namespace: String,

    /// The opaque per-issuer configuration document; see
    /// [`SolverConfig`][crate::config::SolverConfig].
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

// The challenge key is a credential-adjacent value; keep it out of Debug
// output so request dumps stay loggable.
impl fmt::Debug for ChallengeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeRequest")
            .field("resolved_fqdn", &self.resolved_fqdn)
            .field("key", &"<redacted>")
            .field("resource_namespace", &self.resource_namespace)
            .field("config", &self.config)
            .finish()
    }
}
