#![allow(clippy::unwrap_used)]
// Integration tests for `UdpSnmpClient` against a loopback agent.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use secrecy::SecretString;
use tokio::net::UdpSocket;

use netpulse_probe::snmp::ber::{self, Message, PduKind};
use netpulse_probe::snmp::oid::known;
use netpulse_probe::{
    CounterWidth, Error, Oid, SnmpEndpoint, SnmpTransport, SnmpValue, SnmpVersion, UdpSnmpClient,
    VarBind, read_counters,
};

// ── Helpers ─────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct AgentBehavior {
    /// Send a reply with a bogus request-id before the real one.
    stale_first: bool,
    /// Never answer.
    silent: bool,
}

/// Spawn a one-socket SNMP agent serving `mib` for community `public`.
async fn spawn_agent(mib: BTreeMap<Oid, SnmpValue>, behavior: AgentBehavior) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 65_535];
        loop {
            let Ok((n, peer)) = socket.recv_from(&mut buf).await else {
                return;
            };
            if behavior.silent {
                continue;
            }
            let request = ber::decode_message(&buf[..n]).unwrap();
            let mut reply = Message::request(
                request.version,
                &request.community,
                PduKind::Response,
                request.pdu.request_id,
                &[],
            );

            if request.community != b"public" {
                reply.pdu.error_status = 16;
            } else {
                reply.pdu.varbinds = request
                    .pdu
                    .varbinds
                    .iter()
                    .map(|vb| answer(&mib, request.pdu.kind, &vb.oid))
                    .collect();
            }

            if behavior.stale_first {
                let mut stale = reply.clone();
                stale.pdu.request_id = reply.pdu.request_id.wrapping_add(1000);
                stale.pdu.varbinds.clear();
                socket.send_to(&ber::encode_message(&stale), peer).await.unwrap();
            }
            socket.send_to(&ber::encode_message(&reply), peer).await.unwrap();
        }
    });

    addr
}

fn answer(mib: &BTreeMap<Oid, SnmpValue>, kind: PduKind, oid: &Oid) -> VarBind {
    let found = match kind {
        PduKind::GetNextRequest => mib
            .range::<Oid, _>((std::ops::Bound::Excluded(oid), std::ops::Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone())),
        _ => mib.get(oid).map(|v| (oid.clone(), v.clone())),
    };
    let (oid, value) = found.unwrap_or_else(|| {
        let exception = if kind == PduKind::GetNextRequest {
            SnmpValue::EndOfMibView
        } else {
            SnmpValue::NoSuchObject
        };
        (oid.clone(), exception)
    });
    VarBind { oid, value }
}

fn endpoint(addr: SocketAddr, community: &str) -> SnmpEndpoint {
    SnmpEndpoint::new(addr.ip().to_string(), SecretString::from(community.to_owned()))
        .with_port(addr.port())
        .with_version(SnmpVersion::V2c)
        .with_timeout(Duration::from_millis(500))
}

fn switch_mib() -> BTreeMap<Oid, SnmpValue> {
    BTreeMap::from([
        (known::sys_uptime(), SnmpValue::TimeTicks(8_640_000)),
        (known::if_descr().child(1), SnmpValue::OctetString(b"eth0".to_vec())),
        (known::if_in_octets().child(1), SnmpValue::Counter32(1_000)),
        (known::if_out_octets().child(1), SnmpValue::Counter32(2_000)),
        (known::if_oper_status().child(1), SnmpValue::Integer(1)),
        (known::if_hc_in_octets().child(1), SnmpValue::Counter64(5_000_000_000)),
        (known::if_hc_out_octets().child(1), SnmpValue::Counter64(6_000_000_000)),
        (known::if_high_speed().child(1), SnmpValue::Gauge32(1_000)),
    ])
}

// ── Request/response ────────────────────────────────────────────────

#[tokio::test]
async fn test_get_sys_uptime() {
    let addr = spawn_agent(switch_mib(), AgentBehavior::default()).await;
    let client = UdpSnmpClient::new();

    let vbs = client
        .get(&endpoint(addr, "public"), &[known::sys_uptime()])
        .await
        .unwrap();

    assert_eq!(vbs.len(), 1);
    assert_eq!(vbs[0].value, SnmpValue::TimeTicks(8_640_000));
}

#[tokio::test]
async fn test_stale_reply_is_ignored() {
    let behavior = AgentBehavior {
        stale_first: true,
        ..AgentBehavior::default()
    };
    let addr = spawn_agent(switch_mib(), behavior).await;
    let client = UdpSnmpClient::new();

    let vbs = client
        .get(&endpoint(addr, "public"), &[known::sys_uptime()])
        .await
        .unwrap();
    assert_eq!(vbs[0].value, SnmpValue::TimeTicks(8_640_000));
}

#[tokio::test]
async fn test_get_next_walks_forward() {
    let addr = spawn_agent(switch_mib(), AgentBehavior::default()).await;
    let client = UdpSnmpClient::new();

    let vbs = client
        .get_next(&endpoint(addr, "public"), &[known::if_descr()])
        .await
        .unwrap();
    assert_eq!(vbs[0].oid, known::if_descr().child(1));
    assert_eq!(vbs[0].value.as_text().as_deref(), Some("eth0"));
}

// ── Failure modes ───────────────────────────────────────────────────

#[tokio::test]
async fn test_wrong_community_is_auth_error() {
    let addr = spawn_agent(switch_mib(), AgentBehavior::default()).await;
    let client = UdpSnmpClient::new();

    let result = client
        .get(&endpoint(addr, "private"), &[known::sys_uptime()])
        .await;
    assert!(
        matches!(result, Err(Error::SnmpAuth { .. })),
        "expected SnmpAuth, got: {result:?}"
    );
}

#[tokio::test]
async fn test_silent_agent_times_out() {
    let behavior = AgentBehavior {
        silent: true,
        ..AgentBehavior::default()
    };
    let addr = spawn_agent(switch_mib(), behavior).await;
    let client = UdpSnmpClient::new();
    let ep = endpoint(addr, "public").with_timeout(Duration::from_millis(150));

    let result = client.get(&ep, &[known::sys_uptime()]).await;
    match result {
        Err(Error::SnmpTimeout { timeout_ms, .. }) => assert_eq!(timeout_ms, 150),
        other => panic!("expected SnmpTimeout, got: {other:?}"),
    }
}

// ── Traffic read over the wire ──────────────────────────────────────

#[tokio::test]
async fn test_read_counters_end_to_end() {
    let addr = spawn_agent(switch_mib(), AgentBehavior::default()).await;
    let client = UdpSnmpClient::new();

    let reading = read_counters(&client, &endpoint(addr, "public"), 1)
        .await
        .unwrap();

    assert_eq!(reading.width, CounterWidth::Bits64);
    assert_eq!(reading.in_octets, 5_000_000_000);
    assert_eq!(reading.out_octets, 6_000_000_000);
    assert_eq!(reading.link_speed_bps, Some(1_000_000_000));
    assert_eq!(reading.sys_uptime_ticks, Some(8_640_000));
}

#[tokio::test]
async fn test_read_counters_v1_uses_32_bit() {
    let addr = spawn_agent(switch_mib(), AgentBehavior::default()).await;
    let client = UdpSnmpClient::new();
    let ep = endpoint(addr, "public").with_version(SnmpVersion::V1);

    let reading = read_counters(&client, &ep, 1).await.unwrap();
    assert_eq!(reading.width, CounterWidth::Bits32);
    assert_eq!((reading.in_octets, reading.out_octets), (1_000, 2_000));
}
