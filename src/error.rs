//! Error types.

/// Error enumerates the failure states surfaced to the certificate-management
/// controller. Per-server failures are carried separately as [`ClientError`]
/// values and only reach the caller folded into [`Error::QuorumNotMet`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned when a challenge request carries no configuration document.
    #[error("challenge configuration is empty")]
    EmptyConfig,

    /// Returned when the challenge configuration document is not valid JSON,
    /// or a field has the wrong type (e.g. a negative `ttl`).
    #[error("challenge configuration is malformed")]
    InvalidConfig(#[from] serde_json::Error),

    /// Returned when a required configuration field is absent or blank.
    #[error("challenge configuration field \"{0}\" is required")]
    MissingField(&'static str),

    /// Returned when the configured server list is empty. At least one
    /// authoritative server is required before any update can be attempted.
    #[error("challenge configuration lists no DNS servers")]
    NoServers,

    /// Returned when `tsigAlgorithm` names an algorithm this crate does not
    /// implement. See [`TsigAlgorithm`][crate::dns::TsigAlgorithm] for the
    /// recognized set.
    #[error("unrecognized TSIG algorithm \"{0}\"")]
    UnknownAlgorithm(String),

    /// Returned when the shared secret retrieved from the secret store is not
    /// valid base64 text. The offending value is deliberately not echoed.
    #[error("TSIG secret is not valid base64")]
    InvalidSecret,

    /// Returned when the challenge FQDN does not fall within the configured
    /// zone, which would make every update a guaranteed NOTZONE.
    #[error("FQDN \"{fqdn}\" is not within zone \"{zone}\"")]
    FqdnOutsideZone { fqdn: String, zone: String },

    /// Returned when the TXT value does not fit a single 255-octet
    /// character-string, which no server would accept.
    #[error("TXT value of {0} octets exceeds the 255 octet character-string limit")]
    TxtValueTooLong(usize),

    /// Returned by [`present`][crate::solver::MultiDnsSolver::present] and
    /// [`cleanup`][crate::solver::MultiDnsSolver::cleanup] when
    /// [`initialize`][crate::solver::MultiDnsSolver::initialize] has not been
    /// called with a secret-store handle.
    #[error("solver has not been initialized with a secret store")]
    NotInitialized,

    /// Returned when `initialize` is called a second time.
    #[error("solver is already initialized")]
    AlreadyInitialized,

    /// Returned when the named secret does not exist in the namespace.
    #[error("secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },

    /// Returned when the secret exists but does not contain the requested
    /// key.
    #[error("secret {namespace}/{name} has no key \"{key}\"")]
    SecretKeyMissing {
        namespace: String,
        name: String,
        key: String,
    },

    /// Returned when fewer servers accepted a mutation than the quorum rule
    /// requires. Every failing server is enumerated with its cause so the
    /// operator can diagnose which members of the fleet misbehaved.
    #[error(
        "only {succeeded}/{total} servers accepted the update ({required} required): {}",
        join_failures(.failures)
    )]
    QuorumNotMet {
        succeeded: usize,
        required: usize,
        total: usize,
        failures: Vec<ClientError>,
    },
}

/// ClientError enumerates the ways a single dynamic update against a single
/// authoritative server can fail. Each variant names the server it concerns;
/// the fan-out layer collects these rather than propagating them directly.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// Transport-level failure: the update could not be sent, no reply
    /// arrived intact, or the reply could not be parsed.
    #[error("failed to exchange update with {server}: {reason}")]
    Send { server: String, reason: String },

    /// The reply failed TSIG verification, or the server itself reported an
    /// authentication problem (NOTAUTH with BADKEY, BADSIG or BADTIME).
    #[error("TSIG verification failed for {server}: {reason}")]
    Auth { server: String, reason: String },

    /// The server answered with a non-zero RCODE outside the authentication
    /// subset, e.g. REFUSED or NOTZONE. Not retried at this layer.
    #[error("update rejected by {server}: {mnemonic} (rcode {rcode})")]
    Rejected {
        server: String,
        rcode: u8,
        mnemonic: &'static str,
    },

    /// The per-call deadline elapsed before a validated reply arrived.
    #[error("update to {server} timed out")]
    TimedOut { server: String },
}

impl ClientError {
    /// The server this failure concerns.
    pub fn server(&self) -> &str {
        match self {
            ClientError::Send { server, .. }
            | ClientError::Auth { server, .. }
            | ClientError::Rejected { server, .. }
            | ClientError::TimedOut { server } => server,
        }
    }
}

pub(crate) fn join_failures(failures: &[ClientError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
