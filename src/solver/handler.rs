use crate::config::SolverConfig;
use crate::dns::{MultiServerClient, TsigKey};
use crate::error::Error;
use crate::secret::DynSecretStore;
use crate::solver::model::ChallengeRequest;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::info;

/// The solver identifier advertised to the certificate-management
/// controller.
pub const SOLVER_NAME: &str = "multi-dns";

/// Solves DNS-01 challenges by publishing and withdrawing
/// `_acme-challenge` TXT records across the configured server fleet.
///
/// The solver is stateless apart from the secret-store handle installed by
/// [`initialize`][MultiDnsSolver::initialize]; every challenge re-reads its
/// configuration, re-resolves its secret, and builds a fresh single-use
/// [`MultiServerClient`]. Neither the TSIG secret nor the challenge key is
/// ever logged.
#[derive(Default)]
pub struct MultiDnsSolver {
    secrets: OnceLock<DynSecretStore>,
}

impl MultiDnsSolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The advertised solver name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        SOLVER_NAME
    }

    /// Install the secret-store handle. Must be called once before
    /// [`present`][Self::present] or [`cleanup`][Self::cleanup].
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyInitialized`] on a second call.
    pub fn initialize(&self, store: DynSecretStore) -> Result<(), Error> {
        self.secrets
            .set(store)
            .map_err(|_| Error::AlreadyInitialized)
    }

    /// Publish the challenge's key authorization as a TXT record at the
    /// resolved FQDN, succeeding once a majority of the fleet has accepted
    /// it.
    ///
    /// # Errors
    ///
    /// Configuration and secret-resolution failures are returned before any
    /// network traffic; otherwise [`Error::QuorumNotMet`] reports the
    /// failing servers.
    pub async fn present(&self, challenge: &ChallengeRequest) -> Result<(), Error> {
        let started = Instant::now();
        info!(
            fqdn = %challenge.resolved_fqdn,
            namespace = %challenge.resource_namespace,
            "presenting DNS-01 challenge"
        );

        let config = SolverConfig::from_challenge(challenge.config.as_ref())?;
        let fleet = self.fleet(challenge, &config).await?;
        fleet
            .add_txt_all(&challenge.resolved_fqdn, &challenge.key, config.ttl)
            .await?;

        info!(
            fqdn = %challenge.resolved_fqdn,
            servers = config.servers.len(),
            elapsed = ?started.elapsed(),
            "DNS-01 challenge presented"
        );
        Ok(())
    }

    /// Withdraw the challenge's TXT record from the fleet, succeeding once
    /// any server has accepted the deletion.
    ///
    /// # Errors
    ///
    /// Configuration and secret-resolution failures are returned before any
    /// network traffic; otherwise [`Error::QuorumNotMet`] reports the
    /// failing servers.
    pub async fn cleanup(&self, challenge: &ChallengeRequest) -> Result<(), Error> {
        let started = Instant::now();
        info!(
            fqdn = %challenge.resolved_fqdn,
            namespace = %challenge.resource_namespace,
            "cleaning up DNS-01 challenge"
        );

        let config = SolverConfig::from_challenge(challenge.config.as_ref())?;
        let fleet = self.fleet(challenge, &config).await?;
        fleet.delete_txt_all(&challenge.resolved_fqdn).await?;

        info!(
            fqdn = %challenge.resolved_fqdn,
            servers = config.servers.len(),
            elapsed = ?started.elapsed(),
            "DNS-01 challenge cleaned up"
        );
        Ok(())
    }

    /// Resolve the TSIG secret and build the single-use fleet client.
    /// Algorithm validation happens before the secret lookup so configuration
    /// mistakes never touch the secret store.
    async fn fleet(
        &self,
        challenge: &ChallengeRequest,
        config: &SolverConfig,
    ) -> Result<MultiServerClient, Error> {
        let algorithm = config.algorithm()?;
        let store = self.secrets.get().ok_or(Error::NotInitialized)?;
        let secret = store
            .get(
                &challenge.resource_namespace,
                &config.tsig_secret_name,
                &config.tsig_secret_key,
            )
            .await?;
        let key = TsigKey::from_base64(&config.tsig_key_name, algorithm, &secret)?;
        MultiServerClient::new(config.servers.clone(), &config.zone, key)
    }
}
