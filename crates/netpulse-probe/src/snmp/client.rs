// ── UDP transport ──
//
// One ephemeral socket per request, connected to the agent so the kernel
// filters foreign datagrams. Replies carrying a different request-id (late
// answers to an earlier, timed-out request) are skipped.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{debug, instrument, trace};

use super::ber::{self, Message, Pdu, PduKind, VarBind};
use super::{Oid, SnmpEndpoint, SnmpTransport};
use crate::error::Error;

/// Largest datagram we are prepared to read.
const MAX_DATAGRAM: usize = 65_535;

// RFC 3416 error-status values that get a dedicated mapping.
const STATUS_NO_SUCH_NAME: i64 = 2;
const STATUS_AUTHORIZATION_ERROR: i64 = 16;

/// [`SnmpTransport`] over plain UDP.
#[derive(Debug)]
pub struct UdpSnmpClient {
    next_id: AtomicI32,
}

impl UdpSnmpClient {
    pub fn new() -> Self {
        // Seed from the clock so consecutive processes do not reuse ids.
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(1, |d| d.subsec_nanos() & 0x3FFF_FFFF);
        Self {
            next_id: AtomicI32::new(i32::try_from(seed).unwrap_or(1)),
        }
    }

    fn request_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::Relaxed) & 0x7FFF_FFFF
    }

    #[instrument(skip(self, endpoint, oids), fields(target = %endpoint.target(), n = oids.len()))]
    async fn exchange(
        &self,
        endpoint: &SnmpEndpoint,
        kind: PduKind,
        oids: &[Oid],
    ) -> Result<Vec<VarBind>, Error> {
        let target = endpoint.target();
        let request_id = self.request_id();
        let request = ber::encode_message(&Message::request(
            endpoint.version,
            endpoint.community_bytes(),
            kind,
            request_id,
            oids,
        ));

        let pdu = tokio::time::timeout(endpoint.timeout, roundtrip(endpoint, &request, request_id))
            .await
            .map_err(|_| Error::SnmpTimeout {
                target: target.clone(),
                timeout_ms: duration_ms(endpoint.timeout),
            })??;

        check_response(&target, oids, pdu)
    }
}

impl Default for UdpSnmpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnmpTransport for UdpSnmpClient {
    async fn get(&self, endpoint: &SnmpEndpoint, oids: &[Oid]) -> Result<Vec<VarBind>, Error> {
        self.exchange(endpoint, PduKind::GetRequest, oids).await
    }

    async fn get_next(
        &self,
        endpoint: &SnmpEndpoint,
        oids: &[Oid],
    ) -> Result<Vec<VarBind>, Error> {
        self.exchange(endpoint, PduKind::GetNextRequest, oids).await
    }
}

async fn roundtrip(endpoint: &SnmpEndpoint, request: &[u8], request_id: i32) -> Result<Pdu, Error> {
    let addr = resolve(endpoint).await?;
    let local: SocketAddr = if addr.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(addr).await?;
    socket.send(request).await?;

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let n = socket.recv(&mut buf).await?;
        match ber::decode_message(&buf[..n]) {
            Ok(reply)
                if reply.pdu.kind == PduKind::Response && reply.pdu.request_id == request_id =>
            {
                return Ok(reply.pdu);
            }
            Ok(reply) => {
                trace!(got = reply.pdu.request_id, want = request_id, "skipping stale reply");
            }
            Err(e) => debug!(error = %e, "discarding undecodable datagram"),
        }
    }
}

async fn resolve(endpoint: &SnmpEndpoint) -> Result<SocketAddr, Error> {
    if let Some(addr) = endpoint.socket_addr() {
        return Ok(addr);
    }
    tokio::net::lookup_host(endpoint.target())
        .await?
        .next()
        .ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no address for {}", endpoint.address),
            ))
        })
}

/// Map error-status onto the error taxonomy and sanity-check the varbinds.
fn check_response(target: &str, oids: &[Oid], pdu: Pdu) -> Result<Vec<VarBind>, Error> {
    match pdu.error_status {
        0 => {}
        STATUS_AUTHORIZATION_ERROR => {
            return Err(Error::SnmpAuth {
                target: target.to_owned(),
            });
        }
        STATUS_NO_SUCH_NAME => {
            // error-index is 1-based; 0 means "unspecified".
            let what = usize::try_from(pdu.error_index)
                .ok()
                .and_then(|i| i.checked_sub(1))
                .and_then(|i| oids.get(i))
                .map_or_else(|| "requested OIDs".to_owned(), ToString::to_string);
            return Err(Error::SnmpUnsupported {
                target: target.to_owned(),
                what,
            });
        }
        status => {
            return Err(Error::SnmpAgent {
                target: target.to_owned(),
                status,
                index: pdu.error_index,
            });
        }
    }

    if pdu.varbinds.len() != oids.len() {
        return Err(Error::Codec(format!(
            "expected {} varbinds, got {}",
            oids.len(),
            pdu.varbinds.len()
        )));
    }
    Ok(pdu.varbinds)
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
