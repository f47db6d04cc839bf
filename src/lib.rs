//! Multi DNS
//!
//! A multi-server [RFC-2136] dynamic update engine for solving
//! [RFC-8555][RFC-8555] [DNS-01] challenges against a fleet of independent
//! authoritative DNS servers.
//!
//! A certificate-management controller hands the [`solver`] a challenge FQDN
//! and key authorization; the solver publishes the `_acme-challenge` TXT
//! record on every configured server over [TSIG][RFC-8945]-authenticated
//! dynamic updates and withdraws it again after validation. Publication
//! succeeds once a strict majority of the fleet has accepted the record;
//! withdrawal succeeds once any server has.
//!
//! The [`dns`] layer is usable on its own for driving TSIG-signed TXT
//! updates against one server or a whole fleet without the solver surface.
//!
//! [RFC-2136]: https://www.rfc-editor.org/rfc/rfc2136
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [RFC-8945]: https://www.rfc-editor.org/rfc/rfc8945
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
//!
#![warn(clippy::pedantic)]

pub mod config;
pub mod dns;
pub mod error;
pub mod secret;
pub mod solver;

pub use config::SolverConfig;
pub use dns::{MultiServerClient, Rfc2136Client, TsigAlgorithm, TsigKey};
pub use error::{ClientError, Error};
pub use secret::{DynSecretStore, InMemorySecretStore, SecretStore};
pub use solver::{ChallengeRequest, MultiDnsSolver, SOLVER_NAME};
