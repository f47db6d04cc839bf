//! TSIG transaction signatures ([RFC-8945]) for dynamic update exchanges.
//!
//! Requests are signed by appending a TSIG record whose MAC covers the
//! message as transmitted plus the TSIG variables; replies are accepted only
//! when their MAC verifies under the same key, covers the length-prefixed
//! request MAC, and was produced within the fudge window of the local clock.
//!
//! [RFC-8945]: https://www.rfc-editor.org/rfc/rfc8945

use crate::dns::wire::{self, WireError};
use crate::error::Error;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Allowed clock skew between signer and verifier, in seconds.
pub(crate) const FUDGE_SECS: u16 = 300;

const RCODE_NOTAUTH: u8 = 9;
const TSIG_ERROR_BADSIG: u16 = 16;
const TSIG_ERROR_BADKEY: u16 = 17;
const TSIG_ERROR_BADTIME: u16 = 18;

/// Current wall clock as Unix seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

macro_rules! hmac_tag {
    ($digest:ty, $secret:expr, $data:expr) => {{
        use hmac::Mac;
        // NB: new_from_slice is infallible for HMAC, which takes keys of any
        // length.
        let mut mac = hmac::Hmac::<$digest>::new_from_slice($secret)
            .expect("HMAC accepts keys of any length");
        mac.update($data);
        mac.finalize().into_bytes().to_vec()
    }};
}

macro_rules! hmac_check {
    ($digest:ty, $secret:expr, $data:expr, $tag:expr) => {{
        use hmac::Mac;
        let mut mac = hmac::Hmac::<$digest>::new_from_slice($secret)
            .expect("HMAC accepts keys of any length");
        mac.update($data);
        mac.verify_slice($tag).is_ok()
    }};
}

/// The recognized TSIG MAC algorithms. SHA-1 and MD5 are carried for
/// interoperability with legacy server fleets only.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TsigAlgorithm {
    #[default]
    HmacSha256,
    HmacSha512,
    HmacSha1,
    HmacMd5,
}

impl TsigAlgorithm {
    /// Parse an algorithm identifier as found in configuration or on the
    /// wire. Case-insensitive; a trailing dot is optional, and HMAC-MD5 is
    /// also accepted under its historic registry name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim_end_matches('.').to_ascii_lowercase().as_str() {
            "hmac-sha256" => Some(TsigAlgorithm::HmacSha256),
            "hmac-sha512" => Some(TsigAlgorithm::HmacSha512),
            "hmac-sha1" => Some(TsigAlgorithm::HmacSha1),
            "hmac-md5" | "hmac-md5.sig-alg.reg.int" => Some(TsigAlgorithm::HmacMd5),
            _ => None,
        }
    }

    /// The algorithm name in FQDN form, as carried in the TSIG record.
    pub fn wire_name(self) -> &'static str {
        match self {
            TsigAlgorithm::HmacSha256 => "hmac-sha256.",
            TsigAlgorithm::HmacSha512 => "hmac-sha512.",
            TsigAlgorithm::HmacSha1 => "hmac-sha1.",
            TsigAlgorithm::HmacMd5 => "hmac-md5.sig-alg.reg.int.",
        }
    }

    fn compute(self, secret: &[u8], data: &[u8]) -> Vec<u8> {
        match self {
            TsigAlgorithm::HmacSha256 => hmac_tag!(Sha256, secret, data),
            TsigAlgorithm::HmacSha512 => hmac_tag!(Sha512, secret, data),
            TsigAlgorithm::HmacSha1 => hmac_tag!(Sha1, secret, data),
            TsigAlgorithm::HmacMd5 => hmac_tag!(Md5, secret, data),
        }
    }

    /// Constant-time comparison against a full-length MAC.
    fn verify(self, secret: &[u8], data: &[u8], tag: &[u8]) -> bool {
        match self {
            TsigAlgorithm::HmacSha256 => hmac_check!(Sha256, secret, data, tag),
            TsigAlgorithm::HmacSha512 => hmac_check!(Sha512, secret, data, tag),
            TsigAlgorithm::HmacSha1 => hmac_check!(Sha1, secret, data, tag),
            TsigAlgorithm::HmacMd5 => hmac_check!(Md5, secret, data, tag),
        }
    }
}

impl fmt::Display for TsigAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Reasons a reply fails TSIG validation. Folded into the per-server
/// authentication failure by the client.
#[derive(thiserror::Error, Debug)]
pub(crate) enum TsigError {
    #[error("response is not signed")]
    Unsigned,

    #[error("response signed with key \"{got}\", expected \"{expected}\"")]
    KeyMismatch { got: String, expected: String },

    #[error("response signed with algorithm \"{got}\", expected \"{expected}\"")]
    AlgorithmMismatch { got: String, expected: &'static str },

    #[error("response MAC does not verify")]
    MacMismatch,

    #[error("response signed at {time_signed} is outside the {fudge}s fudge window of {now}")]
    TimeSkew {
        time_signed: u64,
        fudge: u16,
        now: u64,
    },

    #[error("server rejected signature: {mnemonic}{detail}")]
    ServerRejected {
        mnemonic: &'static str,
        detail: String,
    },

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// A TSIG key: FQDN-form key name, MAC algorithm, and the shared secret.
///
/// The shared secret is handed over as base64 text, the form in which TSIG
/// secrets are generated (`tsig-keygen`) and stored in platform secret
/// stores, and decoded here so no other layer handles raw key material. The
/// secret lives only in memory and is excluded from `Debug` output.
#[derive(Clone)]
pub struct TsigKey {
    name: String,
    algorithm: TsigAlgorithm,
    secret: Vec<u8>,
}

impl TsigKey {
    /// Build a key from its name, algorithm, and base64-encoded secret.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSecret`] when the secret is not valid base64
    /// text. The value itself is never echoed into the error.
    pub fn from_base64(
        name: &str,
        algorithm: TsigAlgorithm,
        secret_base64: &[u8],
    ) -> Result<Self, Error> {
        let text = std::str::from_utf8(secret_base64).map_err(|_| Error::InvalidSecret)?;
        let secret = BASE64
            .decode(text.trim())
            .map_err(|_| Error::InvalidSecret)?;
        Ok(TsigKey {
            name: wire::normalize_fqdn(name),
            algorithm,
            secret,
        })
    }

    /// The key name, normalized to FQDN form.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn algorithm(&self) -> TsigAlgorithm {
        self.algorithm
    }

    /// Sign a request in place: append the TSIG record and bump ARCOUNT.
    /// Returns the request MAC, needed to verify the reply.
    pub(crate) fn sign_request(&self, msg: &mut Vec<u8>, now: u64) -> Result<Vec<u8>, WireError> {
        if msg.len() < 12 {
            return Err(WireError::Truncated);
        }
        let original_id = u16::from_be_bytes([msg[0], msg[1]]);
        let digest = digest_input(
            None,
            msg,
            &self.name,
            self.algorithm.wire_name(),
            now,
            FUDGE_SECS,
            0,
            &[],
        )?;
        let mac = self.algorithm.compute(&self.secret, &digest);
        wire::append_tsig(
            msg,
            &self.name,
            self.algorithm.wire_name(),
            now,
            FUDGE_SECS,
            &mac,
            original_id,
            0,
            &[],
        )?;
        Ok(mac)
    }

    /// Validate the TSIG record on a reply.
    ///
    /// Server-reported signature errors (NOTAUTH carrying BADKEY, BADSIG or
    /// BADTIME) are surfaced first, since those replies legitimately carry an
    /// empty MAC. Otherwise the key name and algorithm must match ours, the
    /// MAC must verify over the length-prefixed request MAC plus the reply
    /// with its TSIG stripped, and the signing time must fall within the
    /// fudge window.
    pub(crate) fn verify_response(
        &self,
        request_mac: &[u8],
        reply: &[u8],
        now: u64,
    ) -> Result<(), TsigError> {
        let header = wire::Header::parse(reply)?;
        let tsig = wire::extract_tsig(reply)?.ok_or(TsigError::Unsigned)?;

        if header.rcode() == RCODE_NOTAUTH && tsig.error != 0 {
            let detail = if tsig.error == TSIG_ERROR_BADTIME && tsig.other.len() == 6 {
                let mut server_time = [0u8; 8];
                server_time[2..].copy_from_slice(&tsig.other);
                format!(
                    " (signed at {}, server clock {})",
                    tsig.time_signed,
                    u64::from_be_bytes(server_time)
                )
            } else {
                String::new()
            };
            return Err(TsigError::ServerRejected {
                mnemonic: tsig_error_mnemonic(tsig.error),
                detail,
            });
        }

        if tsig.key_name != self.name {
            return Err(TsigError::KeyMismatch {
                got: tsig.key_name,
                expected: self.name.clone(),
            });
        }
        if TsigAlgorithm::from_name(&tsig.algorithm) != Some(self.algorithm) {
            return Err(TsigError::AlgorithmMismatch {
                got: tsig.algorithm,
                expected: self.algorithm.wire_name(),
            });
        }

        let stripped = wire::strip_tsig(reply, &tsig);
        let digest = digest_input(
            Some(request_mac),
            &stripped,
            &self.name,
            self.algorithm.wire_name(),
            tsig.time_signed,
            tsig.fudge,
            tsig.error,
            &tsig.other,
        )?;
        if !self.algorithm.verify(&self.secret, &digest, &tsig.mac) {
            return Err(TsigError::MacMismatch);
        }

        if now.abs_diff(tsig.time_signed) > u64::from(tsig.fudge) {
            return Err(TsigError::TimeSkew {
                time_signed: tsig.time_signed,
                fudge: tsig.fudge,
                now,
            });
        }
        Ok(())
    }

    /// Validate the TSIG record on a request, the way a server would.
    #[cfg(test)]
    pub(crate) fn verify_request(&self, request: &[u8], now: u64) -> Result<(), TsigError> {
        let tsig = wire::extract_tsig(request)?.ok_or(TsigError::Unsigned)?;
        if tsig.key_name != self.name {
            return Err(TsigError::KeyMismatch {
                got: tsig.key_name,
                expected: self.name.clone(),
            });
        }
        if TsigAlgorithm::from_name(&tsig.algorithm) != Some(self.algorithm) {
            return Err(TsigError::AlgorithmMismatch {
                got: tsig.algorithm,
                expected: self.algorithm.wire_name(),
            });
        }
        let stripped = wire::strip_tsig(request, &tsig);
        let digest = digest_input(
            None,
            &stripped,
            &self.name,
            self.algorithm.wire_name(),
            tsig.time_signed,
            tsig.fudge,
            tsig.error,
            &tsig.other,
        )?;
        if !self.algorithm.verify(&self.secret, &digest, &tsig.mac) {
            return Err(TsigError::MacMismatch);
        }
        if now.abs_diff(tsig.time_signed) > u64::from(tsig.fudge) {
            return Err(TsigError::TimeSkew {
                time_signed: tsig.time_signed,
                fudge: tsig.fudge,
                now,
            });
        }
        Ok(())
    }

    /// Sign a reply the way a server would: the MAC additionally covers the
    /// length-prefixed request MAC.
    #[cfg(test)]
    pub(crate) fn sign_response(
        &self,
        msg: &mut Vec<u8>,
        request_mac: &[u8],
        now: u64,
        error: u16,
        other: &[u8],
    ) -> Result<(), WireError> {
        let original_id = u16::from_be_bytes([msg[0], msg[1]]);
        let digest = digest_input(
            Some(request_mac),
            msg,
            &self.name,
            self.algorithm.wire_name(),
            now,
            FUDGE_SECS,
            error,
            other,
        )?;
        let mac = self.algorithm.compute(&self.secret, &digest);
        wire::append_tsig(
            msg,
            &self.name,
            self.algorithm.wire_name(),
            now,
            FUDGE_SECS,
            &mac,
            original_id,
            error,
            other,
        )?;
        Ok(())
    }
}

impl fmt::Debug for TsigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TsigKey")
            .field("name", &self.name)
            .field("algorithm", &self.algorithm)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Assemble the octets covered by a TSIG MAC: the optional length-prefixed
/// request MAC, the message, then the TSIG variables (RFC 8945 §5.3.2).
#[allow(clippy::too_many_arguments)]
fn digest_input(
    request_mac: Option<&[u8]>,
    message: &[u8],
    key_name: &str,
    algorithm: &str,
    time_signed: u64,
    fudge: u16,
    error: u16,
    other: &[u8],
) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::with_capacity(message.len() + 96);
    if let Some(mac) = request_mac {
        buf.extend_from_slice(&(mac.len() as u16).to_be_bytes());
        buf.extend_from_slice(mac);
    }
    buf.extend_from_slice(message);
    wire::push_name(&mut buf, key_name)?;
    buf.extend_from_slice(&wire::CLASS_ANY.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());
    wire::push_name(&mut buf, algorithm)?;
    buf.extend_from_slice(&wire::time_48bit(time_signed));
    buf.extend_from_slice(&fudge.to_be_bytes());
    buf.extend_from_slice(&error.to_be_bytes());
    buf.extend_from_slice(&(other.len() as u16).to_be_bytes());
    buf.extend_from_slice(other);
    Ok(buf)
}

fn tsig_error_mnemonic(error: u16) -> &'static str {
    match error {
        TSIG_ERROR_BADSIG => "BADSIG",
        TSIG_ERROR_BADKEY => "BADKEY",
        TSIG_ERROR_BADTIME => "BADTIME",
        _ => "RESERVED",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::wire::{build_update, extract_tsig, UpdateOp};
    use hmac::Mac;

    const NOW: u64 = 1_700_000_000;

    fn test_key(algorithm: TsigAlgorithm) -> TsigKey {
        let secret = BASE64.encode(b"0123456789abcdef0123456789abcdef");
        TsigKey::from_base64("acme-key", algorithm, secret.as_bytes()).unwrap()
    }

    fn signed_update(key: &TsigKey) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let mut msg = build_update(
            0x0101,
            "example.com.",
            "_acme-challenge.app.example.com.",
            &UpdateOp::Add {
                value: "tokenA",
                ttl: 60,
            },
        )
        .unwrap();
        let unsigned = msg.clone();
        let mac = key.sign_request(&mut msg, NOW).unwrap();
        (msg, unsigned, mac)
    }

    /// Response header with QR set, matching ID, and the given RCODE.
    fn response_message(id: u16, rcode: u8) -> Vec<u8> {
        let mut msg = Vec::with_capacity(12);
        msg.extend_from_slice(&id.to_be_bytes());
        msg.extend_from_slice(&(0x8400u16 | u16::from(rcode)).to_be_bytes());
        msg.extend_from_slice(&[0u8; 8]);
        msg
    }

    // The variables appended to the digest, written out independently of
    // digest_input: key name, class ANY, TTL 0, algorithm, time, fudge,
    // error, other-len.
    fn reference_variables(algorithm_label: &[u8]) -> Vec<u8> {
        let mut vars = Vec::new();
        vars.push(8);
        vars.extend_from_slice(b"acme-key");
        vars.push(0);
        vars.extend_from_slice(&[0x00, 0xFF]);
        vars.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        vars.push(algorithm_label.len() as u8);
        vars.extend_from_slice(algorithm_label);
        vars.push(0);
        vars.extend_from_slice(&NOW.to_be_bytes()[2..]);
        vars.extend_from_slice(&300u16.to_be_bytes());
        vars.extend_from_slice(&[0x00, 0x00]);
        vars.extend_from_slice(&[0x00, 0x00]);
        vars
    }

    #[test]
    fn sha256_request_mac_matches_reference_hmac() {
        let key = test_key(TsigAlgorithm::HmacSha256);
        let (signed, unsigned, _) = signed_update(&key);
        let tsig = extract_tsig(&signed).unwrap().unwrap();

        let mut input = unsigned;
        input.extend_from_slice(&reference_variables(b"hmac-sha256"));
        let mut reference =
            hmac::Hmac::<Sha256>::new_from_slice(b"0123456789abcdef0123456789abcdef").unwrap();
        reference.update(&input);
        assert_eq!(tsig.mac, reference.finalize().into_bytes().to_vec());
    }

    #[test]
    fn sha512_request_mac_matches_reference_hmac() {
        let key = test_key(TsigAlgorithm::HmacSha512);
        let (signed, unsigned, _) = signed_update(&key);
        let tsig = extract_tsig(&signed).unwrap().unwrap();

        let mut input = unsigned;
        input.extend_from_slice(&reference_variables(b"hmac-sha512"));
        let mut reference =
            hmac::Hmac::<Sha512>::new_from_slice(b"0123456789abcdef0123456789abcdef").unwrap();
        reference.update(&input);
        assert_eq!(tsig.mac, reference.finalize().into_bytes().to_vec());
    }

    #[test]
    fn signed_response_round_trips() {
        let key = test_key(TsigAlgorithm::HmacSha256);
        let (_, _, request_mac) = signed_update(&key);

        let mut reply = response_message(0x0101, 0);
        key.sign_response(&mut reply, &request_mac, NOW, 0, &[])
            .unwrap();
        key.verify_response(&request_mac, &reply, NOW + 10).unwrap();
    }

    #[test]
    fn tampered_mac_is_rejected() {
        let key = test_key(TsigAlgorithm::HmacSha256);
        let (_, _, request_mac) = signed_update(&key);

        let mut reply = response_message(0x0101, 0);
        key.sign_response(&mut reply, &request_mac, NOW, 0, &[])
            .unwrap();
        // The final six rdata octets are original ID, error and other-len;
        // the byte before them is the last MAC octet.
        let last_mac_byte = reply.len() - 7;
        reply[last_mac_byte] ^= 0x01;
        assert!(matches!(
            key.verify_response(&request_mac, &reply, NOW),
            Err(TsigError::MacMismatch)
        ));
    }

    #[test]
    fn response_signed_with_other_key_is_rejected() {
        let key = test_key(TsigAlgorithm::HmacSha256);
        let other = TsigKey::from_base64(
            "other-key",
            TsigAlgorithm::HmacSha256,
            BASE64.encode(b"another secret value").as_bytes(),
        )
        .unwrap();
        let (_, _, request_mac) = signed_update(&key);

        let mut reply = response_message(0x0101, 0);
        other
            .sign_response(&mut reply, &request_mac, NOW, 0, &[])
            .unwrap();
        assert!(matches!(
            key.verify_response(&request_mac, &reply, NOW),
            Err(TsigError::KeyMismatch { .. })
        ));
    }

    #[test]
    fn stale_signing_time_is_rejected() {
        let key = test_key(TsigAlgorithm::HmacSha256);
        let (_, _, request_mac) = signed_update(&key);

        let mut reply = response_message(0x0101, 0);
        key.sign_response(&mut reply, &request_mac, NOW - 1_000, 0, &[])
            .unwrap();
        assert!(matches!(
            key.verify_response(&request_mac, &reply, NOW),
            Err(TsigError::TimeSkew { .. })
        ));
    }

    #[test]
    fn server_badtime_is_reported_by_mnemonic() {
        let key = test_key(TsigAlgorithm::HmacSha256);
        let (_, _, request_mac) = signed_update(&key);

        // NOTAUTH reply with TSIG error 18 and the server clock in "other";
        // such replies carry an empty MAC.
        let mut reply = response_message(0x0101, RCODE_NOTAUTH);
        wire::append_tsig(
            &mut reply,
            key.name(),
            key.algorithm().wire_name(),
            NOW,
            FUDGE_SECS,
            &[],
            0x0101,
            TSIG_ERROR_BADTIME,
            &wire::time_48bit(NOW + 4_000),
        )
        .unwrap();

        let err = key.verify_response(&request_mac, &reply, NOW).unwrap_err();
        match err {
            TsigError::ServerRejected { mnemonic, detail } => {
                assert_eq!(mnemonic, "BADTIME");
                assert!(detail.contains(&(NOW + 4_000).to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unsigned_reply_is_rejected() {
        let key = test_key(TsigAlgorithm::HmacSha256);
        let (_, _, request_mac) = signed_update(&key);
        let reply = response_message(0x0101, 0);
        assert!(matches!(
            key.verify_response(&request_mac, &reply, NOW),
            Err(TsigError::Unsigned)
        ));
    }

    #[test]
    fn algorithm_names_parse_loosely() {
        assert_eq!(
            TsigAlgorithm::from_name("HMAC-SHA256."),
            Some(TsigAlgorithm::HmacSha256)
        );
        assert_eq!(
            TsigAlgorithm::from_name("hmac-md5"),
            Some(TsigAlgorithm::HmacMd5)
        );
        assert_eq!(
            TsigAlgorithm::from_name("hmac-md5.sig-alg.reg.int."),
            Some(TsigAlgorithm::HmacMd5)
        );
        assert_eq!(TsigAlgorithm::from_name("hmac-sha224"), None);
        assert_eq!(
            TsigAlgorithm::HmacMd5.wire_name(),
            "hmac-md5.sig-alg.reg.int."
        );
    }

    #[test]
    fn debug_output_redacts_the_secret() {
        let key = test_key(TsigAlgorithm::HmacSha256);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("0123456789abcdef"));
    }

    #[test]
    fn invalid_base64_secret_is_rejected_without_echo() {
        let err = TsigKey::from_base64("k", TsigAlgorithm::HmacSha256, b"%%not-base64%%")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSecret));
        assert!(!err.to_string().contains("not-base64"));
    }
}
