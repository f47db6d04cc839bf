//! Wire-format encoding and decoding for dynamic update messages.
//!
//! Covers exactly the subset of [RFC-1035] framing this crate exchanges: an
//! [RFC-2136] UPDATE request with one Zone entry and one Update record, and
//! the reply header plus trailing TSIG record needed to validate the answer.
//! Names are emitted in lowercased, uncompressed label form; compression
//! pointers are followed (with a hop guard) when reading replies.
//!
//! [RFC-1035]: https://www.rfc-editor.org/rfc/rfc1035
//! [RFC-2136]: https://www.rfc-editor.org/rfc/rfc2136

pub(crate) const OPCODE_UPDATE: u8 = 5;

pub(crate) const CLASS_IN: u16 = 1;
pub(crate) const CLASS_ANY: u16 = 255;

pub(crate) const TYPE_SOA: u16 = 6;
pub(crate) const TYPE_TXT: u16 = 16;
pub(crate) const TYPE_TSIG: u16 = 250;

/// A TXT RDATA holds one or more character-strings of at most 255 octets.
/// ACME key authorizations are published as a single character-string.
pub(crate) const MAX_TXT_STRING: usize = 255;

const MAX_NAME_WIRE: usize = 255;
const MAX_LABEL: usize = 63;
const MAX_POINTER_HOPS: u8 = 32;

const FLAG_QR: u16 = 0x8000;
const FLAG_TC: u16 = 0x0200;

/// Errors produced while encoding or decoding wire messages.
#[derive(thiserror::Error, Debug)]
pub(crate) enum WireError {
    #[error("message truncated")]
    Truncated,

    #[error("empty label in \"{0}\"")]
    EmptyLabel(String),

    #[error("label exceeds {MAX_LABEL} octets in \"{0}\"")]
    LabelTooLong(String),

    #[error("name \"{0}\" exceeds {MAX_NAME_WIRE} octets")]
    NameTooLong(String),

    #[error("TXT value of {0} octets exceeds {MAX_TXT_STRING}")]
    TxtTooLong(usize),

    #[error("compression pointer loop")]
    PointerLoop,

    #[error("reserved label type")]
    BadLabel,

    #[error("malformed TSIG record")]
    BadTsig,
}

/// Normalize a domain name to lowercased FQDN form with a single trailing
/// dot. The root name stays `"."`.
pub(crate) fn normalize_fqdn(name: &str) -> String {
    let mut normalized = name.trim_end_matches('.').to_ascii_lowercase();
    normalized.push('.');
    normalized
}

/// Whether `fqdn` lies within `zone`, on a label boundary. Both arguments are
/// normalized before comparison.
pub(crate) fn in_zone(fqdn: &str, zone: &str) -> bool {
    let fqdn = normalize_fqdn(fqdn);
    let zone = normalize_fqdn(zone);
    if zone == "." {
        return true;
    }
    fqdn == zone || fqdn.ends_with(&format!(".{zone}"))
}

/// The single update this crate knows how to express: publish one TXT value,
/// or delete the whole TXT RRset at a name.
#[derive(Debug, Clone)]
pub(crate) enum UpdateOp<'a> {
    /// Add one TXT record (RFC 2136 §2.5.1, "add to an RRset").
    Add { value: &'a str, ttl: u32 },
    /// Delete every TXT record at the name (RFC 2136 §2.5.2, class ANY,
    /// TTL 0, empty RDATA).
    Delete,
}

impl UpdateOp<'_> {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            UpdateOp::Add { .. } => "add",
            UpdateOp::Delete => "delete",
        }
    }
}

/// Parsed view of a 12-octet message header.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Header {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    pub fn parse(msg: &[u8]) -> Result<Self, WireError> {
        if msg.len() < 12 {
            return Err(WireError::Truncated);
        }
        Ok(Header {
            id: read_u16(msg, 0)?,
            flags: read_u16(msg, 2)?,
            qdcount: read_u16(msg, 4)?,
            ancount: read_u16(msg, 6)?,
            nscount: read_u16(msg, 8)?,
            arcount: read_u16(msg, 10)?,
        })
    }

    pub fn is_response(&self) -> bool {
        self.flags & FLAG_QR != 0
    }

    pub fn truncated(&self) -> bool {
        self.flags & FLAG_TC != 0
    }

    pub fn opcode(&self) -> u8 {
        ((self.flags >> 11) & 0x0F) as u8
    }

    pub fn rcode(&self) -> u8 {
        (self.flags & 0x0F) as u8
    }
}

pub(crate) fn read_u16(msg: &[u8], pos: usize) -> Result<u16, WireError> {
    let bytes = msg.get(pos..pos + 2).ok_or(WireError::Truncated)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn read_u32(msg: &[u8], pos: usize) -> Result<u32, WireError> {
    let bytes = msg.get(pos..pos + 4).ok_or(WireError::Truncated)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Append `name` in uncompressed, lowercased label form.
pub(crate) fn push_name(buf: &mut Vec<u8>, name: &str) -> Result<(), WireError> {
    let normalized = normalize_fqdn(name);
    let mut wire_len = 1;
    let trimmed = normalized.trim_end_matches('.');
    if !trimmed.is_empty() {
        for label in trimmed.split('.') {
            if label.is_empty() {
                return Err(WireError::EmptyLabel(normalized));
            }
            if label.len() > MAX_LABEL {
                return Err(WireError::LabelTooLong(normalized));
            }
            wire_len += 1 + label.len();
            if wire_len > MAX_NAME_WIRE {
                return Err(WireError::NameTooLong(normalized));
            }
            buf.push(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
    }
    buf.push(0);
    Ok(())
}

/// Read a (possibly compressed) name starting at `start`. Returns the name
/// in normalized FQDN form and the offset just past it in the record.
pub(crate) fn read_name(msg: &[u8], start: usize) -> Result<(String, usize), WireError> {
    let mut name = String::new();
    let mut pos = start;
    let mut end = None;
    let mut hops: u8 = 0;

    loop {
        let len = usize::from(*msg.get(pos).ok_or(WireError::Truncated)?);
        if len == 0 {
            if name.is_empty() {
                name.push('.');
            }
            return Ok((name, end.unwrap_or(pos + 1)));
        }
        if len & 0xC0 == 0xC0 {
            let low = usize::from(*msg.get(pos + 1).ok_or(WireError::Truncated)?);
            if end.is_none() {
                end = Some(pos + 2);
            }
            pos = (len & 0x3F) << 8 | low;
            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return Err(WireError::PointerLoop);
            }
        } else if len & 0xC0 != 0 {
            return Err(WireError::BadLabel);
        } else {
            let label = msg.get(pos + 1..pos + 1 + len).ok_or(WireError::Truncated)?;
            for byte in label {
                name.push(char::from(byte.to_ascii_lowercase()));
            }
            name.push('.');
            pos += 1 + len;
        }
    }
}

/// Build a complete unsigned UPDATE message: header, one Zone entry
/// (`zone SOA IN`), empty Prerequisite section, and one Update record for
/// `fqdn`.
pub(crate) fn build_update(
    id: u16,
    zone: &str,
    fqdn: &str,
    op: &UpdateOp<'_>,
) -> Result<Vec<u8>, WireError> {
    let mut msg = Vec::with_capacity(128);
    msg.extend_from_slice(&id.to_be_bytes());
    msg.extend_from_slice(&(u16::from(OPCODE_UPDATE) << 11).to_be_bytes());
    msg.extend_from_slice(&1u16.to_be_bytes()); // ZOCOUNT
    msg.extend_from_slice(&0u16.to_be_bytes()); // PRCOUNT
    msg.extend_from_slice(&1u16.to_be_bytes()); // UPCOUNT
    msg.extend_from_slice(&0u16.to_be_bytes()); // ADCOUNT

    push_name(&mut msg, zone)?;
    msg.extend_from_slice(&TYPE_SOA.to_be_bytes());
    msg.extend_from_slice(&CLASS_IN.to_be_bytes());

    push_name(&mut msg, fqdn)?;
    msg.extend_from_slice(&TYPE_TXT.to_be_bytes());
    match op {
        UpdateOp::Add { value, ttl } => {
            let data = value.as_bytes();
            if data.len() > MAX_TXT_STRING {
                return Err(WireError::TxtTooLong(data.len()));
            }
            msg.extend_from_slice(&CLASS_IN.to_be_bytes());
            msg.extend_from_slice(&ttl.to_be_bytes());
            msg.extend_from_slice(&((data.len() as u16) + 1).to_be_bytes());
            msg.push(data.len() as u8);
            msg.extend_from_slice(data);
        }
        UpdateOp::Delete => {
            msg.extend_from_slice(&CLASS_ANY.to_be_bytes());
            msg.extend_from_slice(&0u32.to_be_bytes());
            msg.extend_from_slice(&0u16.to_be_bytes());
        }
    }
    Ok(msg)
}

/// Parsed view of the TSIG record trailing a message, together with the
/// offset at which the record starts (used to reconstruct the signed bytes).
#[derive(Debug, Clone)]
pub(crate) struct TsigView {
    pub start: usize,
    pub key_name: String,
    pub algorithm: String,
    pub time_signed: u64,
    pub fudge: u16,
    pub mac: Vec<u8>,
    pub original_id: u16,
    pub error: u16,
    pub other: Vec<u8>,
}

/// Locate and parse a TSIG record. Per RFC 8945 it must be the last record
/// of the additional section; anything else yields `None`.
pub(crate) fn extract_tsig(msg: &[u8]) -> Result<Option<TsigView>, WireError> {
    let header = Header::parse(msg)?;
    let mut pos = 12;
    for _ in 0..header.qdcount {
        let (_, next) = read_name(msg, pos)?;
        pos = next + 4;
    }
    if header.arcount == 0 {
        return Ok(None);
    }

    let records =
        usize::from(header.ancount) + usize::from(header.nscount) + usize::from(header.arcount);
    let mut last = None;
    for _ in 0..records {
        let start = pos;
        let (owner, after_name) = read_name(msg, pos)?;
        let rtype = read_u16(msg, after_name)?;
        let rdlen = usize::from(read_u16(msg, after_name + 8)?);
        pos = after_name + 10 + rdlen;
        if pos > msg.len() {
            return Err(WireError::Truncated);
        }
        last = Some((start, owner, rtype, after_name, rdlen));
    }

    let Some((start, key_name, rtype, after_name, rdlen)) = last else {
        return Ok(None);
    };
    if rtype != TYPE_TSIG {
        return Ok(None);
    }

    let rdata_start = after_name + 10;
    let rdata_end = rdata_start + rdlen;
    let (algorithm, mut cursor) = read_name(msg, rdata_start)?;
    let time_hi = read_u16(msg, cursor)?;
    let time_lo = read_u32(msg, cursor + 2)?;
    cursor += 6;
    let fudge = read_u16(msg, cursor)?;
    cursor += 2;
    let mac_len = usize::from(read_u16(msg, cursor)?);
    cursor += 2;
    let mac = msg
        .get(cursor..cursor + mac_len)
        .ok_or(WireError::Truncated)?
        .to_vec();
    cursor += mac_len;
    let original_id = read_u16(msg, cursor)?;
    cursor += 2;
    let error = read_u16(msg, cursor)?;
    cursor += 2;
    let other_len = usize::from(read_u16(msg, cursor)?);
    cursor += 2;
    let other = msg
        .get(cursor..cursor + other_len)
        .ok_or(WireError::Truncated)?
        .to_vec();
    cursor += other_len;
    if cursor != rdata_end {
        return Err(WireError::BadTsig);
    }

    Ok(Some(TsigView {
        start,
        key_name,
        algorithm,
        time_signed: u64::from(time_hi) << 32 | u64::from(time_lo),
        fudge,
        mac,
        original_id,
        error,
        other,
    }))
}

/// Append a TSIG record to the additional section of `msg`, bumping ARCOUNT.
#[allow(clippy::too_many_arguments)]
pub(crate) fn append_tsig(
    msg: &mut Vec<u8>,
    key_name: &str,
    algorithm: &str,
    time_signed: u64,
    fudge: u16,
    mac: &[u8],
    original_id: u16,
    error: u16,
    other: &[u8],
) -> Result<(), WireError> {
    if msg.len() < 12 {
        return Err(WireError::Truncated);
    }
    let arcount = read_u16(msg, 10)? + 1;
    msg[10..12].copy_from_slice(&arcount.to_be_bytes());

    push_name(msg, key_name)?;
    msg.extend_from_slice(&TYPE_TSIG.to_be_bytes());
    msg.extend_from_slice(&CLASS_ANY.to_be_bytes());
    msg.extend_from_slice(&0u32.to_be_bytes());

    let mut rdata = Vec::with_capacity(64 + mac.len());
    push_name(&mut rdata, algorithm)?;
    rdata.extend_from_slice(&time_48bit(time_signed));
    rdata.extend_from_slice(&fudge.to_be_bytes());
    rdata.extend_from_slice(&(mac.len() as u16).to_be_bytes());
    rdata.extend_from_slice(mac);
    rdata.extend_from_slice(&original_id.to_be_bytes());
    rdata.extend_from_slice(&error.to_be_bytes());
    rdata.extend_from_slice(&(other.len() as u16).to_be_bytes());
    rdata.extend_from_slice(other);

    msg.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    msg.extend_from_slice(&rdata);
    Ok(())
}

/// The message bytes covered by a TSIG MAC: everything before the TSIG
/// record, with ARCOUNT decremented and the ID restored to the original.
pub(crate) fn strip_tsig(msg: &[u8], tsig: &TsigView) -> Vec<u8> {
    let mut stripped = msg[..tsig.start].to_vec();
    stripped[0..2].copy_from_slice(&tsig.original_id.to_be_bytes());
    let arcount = u16::from_be_bytes([stripped[10], stripped[11]]).saturating_sub(1);
    stripped[10..12].copy_from_slice(&arcount.to_be_bytes());
    stripped
}

/// "Time Signed" is a 48-bit quantity on the wire.
pub(crate) fn time_48bit(time: u64) -> [u8; 6] {
    let bytes = time.to_be_bytes();
    [bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]]
}

pub(crate) fn rcode_mnemonic(rcode: u8) -> &'static str {
    match rcode {
        0 => "NOERROR",
        1 => "FORMERR",
        2 => "SERVFAIL",
        3 => "NXDOMAIN",
        4 => "NOTIMP",
        5 => "REFUSED",
        6 => "YXDOMAIN",
        7 => "YXRRSET",
        8 => "NXRRSET",
        9 => "NOTAUTH",
        10 => "NOTZONE",
        _ => "RESERVED",
    }
}
