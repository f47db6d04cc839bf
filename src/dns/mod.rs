//! Authenticated dynamic DNS updates, one server at a time or fleet-wide.
//!
//! # Single server
//!
//! [`Rfc2136Client`] performs one [RFC-2136] UPDATE against one authoritative
//! server: it builds the message, signs it with [TSIG][RFC-8945], sends it
//! over UDP port 53 (falling back to TCP when the reply is truncated), and
//! accepts the reply only after its TSIG signature verifies.
//!
//! # Fleet
//!
//! [`MultiServerClient`] fans the same mutation out to every configured
//! server concurrently and reduces the outcomes under a quorum rule:
//! publishing a record requires a strict majority of the fleet, withdrawing
//! one requires a single success.
//!
//! ```no_run
//! use multidns::dns::{MultiServerClient, TsigAlgorithm, TsigKey};
//!
//! # async fn example() -> Result<(), multidns::error::Error> {
//! let key = TsigKey::from_base64(
//!     "acme-key",
//!     TsigAlgorithm::HmacSha256,
//!     b"c2VjcmV0IGtleSBieXRlcw==",
//! )?;
//! let fleet = MultiServerClient::new(
//!     vec!["10.0.0.1".to_string(), "10.0.0.2".to_string(), "10.0.0.3".to_string()],
//!     "example.com.",
//!     key,
//! )?;
//! fleet
//!     .add_txt_all("_acme-challenge.app.example.com.", "token", 60)
//!     .await?;
//! fleet.delete_txt_all("_acme-challenge.app.example.com.").await?;
//! # Ok(())
//! # }
//! ```
//!
//! [RFC-2136]: https://www.rfc-editor.org/rfc/rfc2136
//! [RFC-8945]: https://www.rfc-editor.org/rfc/rfc8945

pub mod client;
pub mod multi;
pub mod tsig;
pub(crate) mod wire;

#[cfg(test)]
pub(crate) mod testing;

pub use client::Rfc2136Client;
pub use multi::MultiServerClient;
pub use tsig::{TsigAlgorithm, TsigKey};
