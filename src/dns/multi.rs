//! Fan-out of one logical mutation across a fleet of authoritative servers.

use crate::dns::client::{Rfc2136Client, DEFAULT_TIMEOUT};
use crate::dns::tsig::TsigKey;
use crate::dns::wire;
use crate::error::{ClientError, Error};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Applies the same TXT mutation to every configured server concurrently and
/// reduces the per-server outcomes under a quorum rule.
///
/// The quorum is deliberately asymmetric. Publishing requires a strict
/// majority: a record visible on only a minority of the fleet invites
/// validation failures from whichever authority the ACME server happens to
/// query. Withdrawal requires a single success: a record removed anywhere is
/// better than a record removed nowhere, and the remaining copies age out.
///
/// An instance serves one logical mutation and is then discarded; it holds no
/// state beyond its construction parameters. There is no retry here — the
/// certificate-management controller re-drives the whole challenge with its
/// own backoff.
#[derive(Debug, Clone)]
pub struct MultiServerClient {
    servers: Vec<String>,
    zone: String,
    key: TsigKey,
    timeout: Duration,
}

#[derive(Debug, Clone)]
enum Mutation {
    Present { value: String, ttl: u32 },
    CleanUp,
}

impl MultiServerClient {
    /// A coordinator over `servers`, all authoritative for `zone`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoServers`] for an empty server list; no I/O has
    /// happened at that point.
    pub fn new(servers: Vec<String>, zone: &str, key: TsigKey) -> Result<Self, Error> {
        if servers.is_empty() {
            return Err(Error::NoServers);
        }
        Ok(MultiServerClient {
            servers,
            zone: wire::normalize_fqdn(zone),
            key,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Replace the default per-server call deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Successes required for a publish: a strict majority of the fleet.
    pub fn add_threshold(&self) -> usize {
        self.servers.len() / 2 + 1
    }

    /// Publish `value` as a TXT record at `fqdn` on every server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FqdnOutsideZone`] before any I/O when `fqdn` is not
    /// within the zone, or [`Error::QuorumNotMet`] when fewer than a majority
    /// of servers accept the update.
    pub async fn add_txt_all(&self, fqdn: &str, value: &str, ttl: u32) -> Result<(), Error> {
        self.fan_out(
            fqdn,
            Mutation::Present {
                value: value.to_string(),
                ttl,
            },
            self.add_threshold(),
        )
        .await
    }

    /// Delete the TXT RRset at `fqdn` on every server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FqdnOutsideZone`] before any I/O when `fqdn` is not
    /// within the zone, or [`Error::QuorumNotMet`] when no server at all
    /// accepts the deletion.
    pub async fn delete_txt_all(&self, fqdn: &str) -> Result<(), Error> {
        self.fan_out(fqdn, Mutation::CleanUp, 1).await
    }

    async fn fan_out(&self, fqdn: &str, mutation: Mutation, required: usize) -> Result<(), Error> {
        let fqdn = wire::normalize_fqdn(fqdn);
        if !wire::in_zone(&fqdn, &self.zone) {
            return Err(Error::FqdnOutsideZone {
                fqdn,
                zone: self.zone.clone(),
            });
        }
        if let Mutation::Present { value, .. } = &mutation {
            if value.len() > wire::MAX_TXT_STRING {
                return Err(Error::TxtValueTooLong(value.len()));
            }
        }

        info!(
            %fqdn,
            op = mutation.kind(),
            servers = self.servers.len(),
            required,
            "dispatching dynamic update to all servers"
        );

        let mut tasks = JoinSet::new();
        for server in &self.servers {
            let server = server.clone();
            let zone = self.zone.clone();
            let key = self.key.clone();
            let fqdn = fqdn.clone();
            let mutation = mutation.clone();
            let timeout = self.timeout;
            tasks.spawn(async move {
                let client = Rfc2136Client::new(&*server, &zone, key).with_timeout(timeout);
                let outcome = match &mutation {
                    Mutation::Present { value, ttl } => client.add_txt(&fqdn, value, *ttl).await,
                    Mutation::CleanUp => client.delete_txt(&fqdn).await,
                };
                (server, outcome)
            });
        }

        // Every server is attempted even once the threshold is met; the
        // fleet should converge, not just the quorum.
        let mut succeeded = 0usize;
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((server, Ok(()))) => {
                    debug!(%server, %fqdn, "server accepted update");
                    succeeded += 1;
                }
                Ok((server, Err(cause))) => {
                    error!(%server, %fqdn, %cause, "server failed update");
                    failures.push(cause);
                }
                Err(join_error) => {
                    error!(%join_error, "update task did not complete");
                    failures.push(ClientError::Send {
                        server: "(unknown)".to_string(),
                        reason: join_error.to_string(),
                    });
                }
            }
        }

        if succeeded < required {
            error!(
                %fqdn,
                succeeded,
                required,
                total = self.servers.len(),
                "quorum not met"
            );
            return Err(Error::QuorumNotMet {
                succeeded,
                required,
                total: self.servers.len(),
                failures,
            });
        }
        if !failures.is_empty() {
            warn!(
                %fqdn,
                succeeded,
                failed = failures.len(),
                "quorum met with some servers failing"
            );
        }
        info!(
            %fqdn,
            op = mutation.kind(),
            succeeded,
            total = self.servers.len(),
            "dynamic update applied"
        );
        Ok(())
    }
}

impl Mutation {
    fn kind(&self) -> &'static str {
        match self {
            Mutation::Present { .. } => "present",
            Mutation::CleanUp => "cleanup",
        }
    }
}
