//! A scripted fake authoritative server for exercising the update path.
//!
//! Each instance listens on a loopback UDP socket (and a TCP listener on the
//! same port, for truncation retries), parses every UPDATE it receives,
//! verifies its TSIG signature, applies the mutation to an in-memory zone,
//! and answers according to the configured [`Behavior`]. Received updates are
//! captured for assertion.

use crate::dns::client::Rfc2136Client;
use crate::dns::tsig::{unix_now, TsigAlgorithm, TsigKey, FUDGE_SECS};
use crate::dns::wire;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

pub(crate) const TEST_KEY_NAME: &str = "acme-key";
pub(crate) const TEST_SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

/// Install a subscriber so failing tests print their events. Safe to call
/// from every test; only the first call wins.
pub(crate) fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "multidns=debug".into()),
        )
        .try_init();
}

/// The shared secret as the base64 text a secret store would hold.
pub(crate) fn test_secret_base64() -> Vec<u8> {
    BASE64.encode(TEST_SECRET).into_bytes()
}

/// The key every fake server verifies against and signs with.
pub(crate) fn test_key() -> TsigKey {
    TsigKey::from_base64(
        TEST_KEY_NAME,
        TsigAlgorithm::HmacSha256,
        &test_secret_base64(),
    )
    .expect("test key")
}

/// How a fake server answers each update it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    /// Apply the mutation to the in-memory zone and answer NOERROR.
    Answer,
    /// Answer with the given RCODE without touching the zone.
    Rcode(u8),
    /// Never answer; the client's deadline must fire.
    Ignore,
    /// Answer UDP with the TC bit set; serve the real answer over TCP.
    TruncateUdp,
    /// Sign the NOERROR answer with a different secret.
    WrongKey,
    /// Answer NOTAUTH with TSIG error BADTIME and the server clock in
    /// "other", the shape a skewed server produces.
    BadTime,
}

/// One update as seen by a fake server.
#[derive(Debug, Clone)]
pub(crate) struct CapturedUpdate {
    pub opcode: u8,
    pub zone: String,
    pub name: String,
    pub rtype: u16,
    pub class: u16,
    pub ttl: u32,
    pub value: Option<String>,
    pub tsig_algorithm: String,
    pub mac_verified: bool,
}

#[derive(Default)]
struct ZoneState {
    captured: Mutex<Vec<CapturedUpdate>>,
    records: Mutex<HashMap<String, Vec<String>>>,
    requests: AtomicUsize,
}

struct Inner {
    key: TsigKey,
    wrong_key: TsigKey,
    behavior: Behavior,
    state: ZoneState,
}

pub(crate) struct FakeDnsServer {
    addr: SocketAddr,
    inner: Arc<Inner>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Transport {
    Udp,
    Tcp,
}

impl FakeDnsServer {
    pub(crate) async fn start(behavior: Behavior) -> Self {
        init_tracing();
        let (udp, tcp) = bind_pair().await;
        let addr = udp.local_addr().expect("local addr");
        let wrong_key = TsigKey::from_base64(
            TEST_KEY_NAME,
            TsigAlgorithm::HmacSha256,
            BASE64.encode(b"not the shared secret at all!!").as_bytes(),
        )
        .expect("test key");
        let inner = Arc::new(Inner {
            key: test_key(),
            wrong_key,
            behavior,
            state: ZoneState::default(),
        });

        let udp_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                let Ok((received, peer)) = udp.recv_from(&mut buf).await else {
                    return;
                };
                if let Some(reply) = udp_inner.handle(&buf[..received], Transport::Udp) {
                    let _ = udp.send_to(&reply, peer).await;
                }
            }
        });

        let tcp_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = tcp.accept().await else {
                    return;
                };
                let inner = Arc::clone(&tcp_inner);
                tokio::spawn(async move {
                    let mut len = [0u8; 2];
                    if stream.read_exact(&mut len).await.is_err() {
                        return;
                    }
                    let mut msg = vec![0u8; usize::from(u16::from_be_bytes(len))];
                    if stream.read_exact(&mut msg).await.is_err() {
                        return;
                    }
                    if let Some(reply) = inner.handle(&msg, Transport::Tcp) {
                        let mut framed = Vec::with_capacity(reply.len() + 2);
                        framed.extend_from_slice(&(reply.len() as u16).to_be_bytes());
                        framed.extend_from_slice(&reply);
                        let _ = stream.write_all(&framed).await;
                    }
                });
            }
        });

        FakeDnsServer { addr, inner }
    }

    /// The `ip:port` string tests hand to clients and configuration.
    pub(crate) fn address(&self) -> String {
        self.addr.to_string()
    }

    /// A client for this server using the shared test key.
    pub(crate) fn client(&self, zone: &str) -> Rfc2136Client {
        Rfc2136Client::new(self.address(), zone, test_key())
    }

    pub(crate) fn captured(&self) -> Vec<CapturedUpdate> {
        self.inner.state.captured.lock().expect("lock").clone()
    }

    pub(crate) fn requests(&self) -> usize {
        self.inner.state.requests.load(Ordering::SeqCst)
    }

    /// TXT values currently stored at `fqdn`.
    pub(crate) fn txt_records(&self, fqdn: &str) -> Vec<String> {
        self.inner
            .state
            .records
            .lock()
            .expect("lock")
            .get(&wire::normalize_fqdn(fqdn))
            .cloned()
            .unwrap_or_default()
    }
}

/// Bind a UDP socket and a TCP listener on the same loopback port.
async fn bind_pair() -> (UdpSocket, TcpListener) {
    for _ in 0..16 {
        let udp = UdpSocket::bind("127.0.0.1:0").await.expect("bind udp");
        let port = udp.local_addr().expect("local addr").port();
        if let Ok(tcp) = TcpListener::bind(("127.0.0.1", port)).await {
            return (udp, tcp);
        }
    }
    panic!("could not bind a udp/tcp port pair");
}

impl Inner {
    fn handle(&self, request: &[u8], transport: Transport) -> Option<Vec<u8>> {
        self.state.requests.fetch_add(1, Ordering::SeqCst);
        let parsed = self.parse_update(request)?;
        let request_id = parsed.id;
        let request_mac = parsed.mac.clone();

        self.state
            .captured
            .lock()
            .expect("lock")
            .push(parsed.capture.clone());

        match (self.behavior, transport) {
            (Behavior::Ignore, _) => None,
            (Behavior::TruncateUdp, Transport::Udp) => Some(truncated_reply(request_id)),
            (Behavior::Answer | Behavior::TruncateUdp, _) => {
                self.apply(&parsed.capture);
                self.signed_reply(&self.key, request_id, &request_mac, 0)
            }
            (Behavior::Rcode(rcode), _) => {
                self.signed_reply(&self.key, request_id, &request_mac, rcode)
            }
            (Behavior::WrongKey, _) => {
                self.signed_reply(&self.wrong_key, request_id, &request_mac, 0)
            }
            (Behavior::BadTime, _) => Some(badtime_reply(&self.key, request_id)),
        }
    }

    fn apply(&self, update: &CapturedUpdate) {
        let mut records = self.state.records.lock().expect("lock");
        if update.class == wire::CLASS_ANY {
            records.remove(&update.name);
        } else if let Some(value) = &update.value {
            records.entry(update.name.clone()).or_default().push(value.clone());
        }
    }

    fn parse_update(&self, request: &[u8]) -> Option<ParsedUpdate> {
        let header = wire::Header::parse(request).ok()?;
        let (zone, pos) = wire::read_name(request, 12).ok()?;
        let pos = pos + 4;

        let (name, pos) = wire::read_name(request, pos).ok()?;
        let rtype = wire::read_u16(request, pos).ok()?;
        let class = wire::read_u16(request, pos + 2).ok()?;
        let ttl = wire::read_u32(request, pos + 4).ok()?;
        let rdlen = usize::from(wire::read_u16(request, pos + 8).ok()?);
        let value = if rdlen > 1 {
            let text_len = usize::from(*request.get(pos + 10)?);
            let text = request.get(pos + 11..pos + 11 + text_len)?;
            Some(String::from_utf8_lossy(text).into_owned())
        } else {
            None
        };

        let tsig = wire::extract_tsig(request).ok()??;
        let mac_verified = self.key.verify_request(request, unix_now()).is_ok();

        Some(ParsedUpdate {
            id: header.id,
            mac: tsig.mac.clone(),
            capture: CapturedUpdate {
                opcode: header.opcode(),
                zone,
                name,
                rtype,
                class,
                ttl,
                value,
                tsig_algorithm: tsig.algorithm,
                mac_verified,
            },
        })
    }

    fn signed_reply(
        &self,
        key: &TsigKey,
        request_id: u16,
        request_mac: &[u8],
        rcode: u8,
    ) -> Option<Vec<u8>> {
        let mut reply = reply_header(request_id, rcode);
        key.sign_response(&mut reply, request_mac, unix_now(), 0, &[])
            .ok()?;
        Some(reply)
    }
}

struct ParsedUpdate {
    id: u16,
    mac: Vec<u8>,
    capture: CapturedUpdate,
}

fn reply_header(id: u16, rcode: u8) -> Vec<u8> {
    let mut reply = Vec::with_capacity(12);
    reply.extend_from_slice(&id.to_be_bytes());
    reply.extend_from_slice(&(0xA800u16 | u16::from(rcode)).to_be_bytes());
    reply.extend_from_slice(&[0u8; 8]);
    reply
}

fn truncated_reply(id: u16) -> Vec<u8> {
    let mut reply = reply_header(id, 0);
    reply[2] |= 0x02; // TC
    reply
}

fn badtime_reply(key: &TsigKey, id: u16) -> Vec<u8> {
    let mut reply = reply_header(id, 9);
    wire::append_tsig(
        &mut reply,
        key.name(),
        key.algorithm().wire_name(),
        unix_now(),
        FUDGE_SECS,
        &[],
        id,
        18,
        &wire::time_48bit(unix_now() + 4_000),
    )
    .expect("badtime reply");
    reply
}
