//! A dynamic update client for a single authoritative server.

use crate::dns::tsig::{unix_now, TsigKey};
use crate::dns::wire::{self, UpdateOp};
use crate::error::ClientError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tracing::debug;

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DNS_PORT: u16 = 53;
const MAX_UDP_REPLY: usize = 4096;

/// Performs one authenticated [RFC-2136] update against one server per call.
///
/// The client holds no connection state: every call opens a fresh UDP socket
/// (and a fresh TCP connection if the reply comes back truncated), so
/// instances are cheap and single-purpose. Replies must carry a valid TSIG
/// signature under the configured key before their RCODE is even considered.
///
/// [RFC-2136]: https://www.rfc-editor.org/rfc/rfc2136
#[derive(Debug, Clone)]
pub struct Rfc2136Client {
    server: String,
    zone: String,
    key: TsigKey,
    timeout: Duration,
}

impl Rfc2136Client {
    /// A client for `server`, authoritative for `zone`, signing with `key`.
    ///
    /// `server` may be an IP address, an `ip:port` pair, or a hostname;
    /// bare addresses and hostnames use port 53.
    pub fn new(server: impl Into<String>, zone: &str, key: TsigKey) -> Self {
        Rfc2136Client {
            server: server.into(),
            zone: wire::normalize_fqdn(zone),
            key,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Replace the default 10 s per-call deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Publish one TXT record at `fqdn` (added to any existing RRset).
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] naming this server when the exchange fails,
    /// the reply fails TSIG verification, or the server rejects the update.
    pub async fn add_txt(&self, fqdn: &str, value: &str, ttl: u32) -> Result<(), ClientError> {
        self.update(fqdn, UpdateOp::Add { value, ttl }).await
    }

    /// Delete the entire TXT RRset at `fqdn`, whatever its values.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] naming this server when the exchange fails,
    /// the reply fails TSIG verification, or the server rejects the update.
    pub async fn delete_txt(&self, fqdn: &str) -> Result<(), ClientError> {
        self.update(fqdn, UpdateOp::Delete).await
    }

    async fn update(&self, fqdn: &str, op: UpdateOp<'_>) -> Result<(), ClientError> {
        tokio::time::timeout(self.timeout, self.exchange(fqdn, op))
            .await
            .map_err(|_| ClientError::TimedOut {
                server: self.server.clone(),
            })?
    }

    async fn exchange(&self, fqdn: &str, op: UpdateOp<'_>) -> Result<(), ClientError> {
        let id = rand::random::<u16>();
        let fqdn = wire::normalize_fqdn(fqdn);
        let mut msg = wire::build_update(id, &self.zone, &fqdn, &op)
            .map_err(|err| self.send_error(err))?;
        let request_mac = self
            .key
            .sign_request(&mut msg, unix_now())
            .map_err(|err| self.send_error(err))?;

        let addr = self.resolve().await?;
        debug!(server = %self.server, %fqdn, op = op.kind(), "sending dynamic update");

        let mut reply = self.udp_exchange(addr, &msg).await?;
        let mut header = wire::Header::parse(&reply).map_err(|err| self.send_error(err))?;
        if header.truncated() {
            debug!(server = %self.server, "reply truncated, retrying over TCP");
            reply = self.tcp_exchange(addr, &msg).await?;
            header = wire::Header::parse(&reply).map_err(|err| self.send_error(err))?;
        }

        self.validate(id, &request_mac, &reply, header)
    }

    fn validate(
        &self,
        id: u16,
        request_mac: &[u8],
        reply: &[u8],
        header: wire::Header,
    ) -> Result<(), ClientError> {
        if !header.is_response() || header.id != id {
            return Err(self.send_error("reply does not match request"));
        }
        self.key
            .verify_response(request_mac, reply, unix_now())
            .map_err(|err| ClientError::Auth {
                server: self.server.clone(),
                reason: err.to_string(),
            })?;
        match header.rcode() {
            0 => {
                debug!(server = %self.server, "dynamic update accepted");
                Ok(())
            }
            9 => Err(ClientError::Auth {
                server: self.server.clone(),
                reason: "server reported NOTAUTH".to_string(),
            }),
            rcode => Err(ClientError::Rejected {
                server: self.server.clone(),
                rcode,
                mnemonic: wire::rcode_mnemonic(rcode),
            }),
        }
    }

    async fn resolve(&self) -> Result<SocketAddr, ClientError> {
        if let Ok(addr) = self.server.parse::<SocketAddr>() {
            return Ok(addr);
        }
        if let Ok(ip) = self.server.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, DNS_PORT));
        }
        lookup_host((self.server.as_str(), DNS_PORT))
            .await
            .map_err(|err| self.send_error(err))?
            .next()
            .ok_or_else(|| self.send_error("hostname resolved to no addresses"))
    }

    async fn udp_exchange(&self, addr: SocketAddr, msg: &[u8]) -> Result<Vec<u8>, ClientError> {
        let bind = if addr.is_ipv4() {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
        } else {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
        };
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|err| self.send_error(err))?;
        socket
            .connect(addr)
            .await
            .map_err(|err| self.send_error(err))?;
        socket.send(msg).await.map_err(|err| self.send_error(err))?;

        let mut buf = vec![0u8; MAX_UDP_REPLY];
        let received = socket
            .recv(&mut buf)
            .await
            .map_err(|err| self.send_error(err))?;
        buf.truncate(received);
        Ok(buf)
    }

    async fn tcp_exchange(&self, addr: SocketAddr, msg: &[u8]) -> Result<Vec<u8>, ClientError> {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|err| self.send_error(err))?;

        let mut framed = Vec::with_capacity(msg.len() + 2);
        framed.extend_from_slice(&(msg.len() as u16).to_be_bytes());
        framed.extend_from_slice(msg);
        stream
            .write_all(&framed)
            .await
            .map_err(|err| self.send_error(err))?;

        let mut len = [0u8; 2];
        stream
            .read_exact(&mut len)
            .await
            .map_err(|err| self.send_error(err))?;
        let mut reply = vec![0u8; usize::from(u16::from_be_bytes(len))];
        stream
            .read_exact(&mut reply)
            .await
            .map_err(|err| self.send_error(err))?;
        Ok(reply)
    }

    fn send_error(&self, reason: impl ToString) -> ClientError {
        ClientError::Send {
            server: self.server.clone(),
            reason: reason.to_string(),
        }
    }
}
