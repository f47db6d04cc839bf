//! The challenge-solver surface exposed to the certificate-management
//! controller.
//!
//! The controller resolves an ACME DNS-01 challenge to a
//! [`ChallengeRequest`] — the `_acme-challenge` FQDN, the key authorization
//! to publish, the namespace holding the TSIG secret, and the opaque
//! per-issuer configuration — and calls
//! [`present`][MultiDnsSolver::present] to publish the record or
//! [`cleanup`][MultiDnsSolver::cleanup] to withdraw it once validation has
//! finished. Request deserialization and the serving endpoint live with the
//! controller glue, not here.

mod handler;
mod model;

pub use handler::{MultiDnsSolver, SOLVER_NAME};
pub use model::ChallengeRequest;
