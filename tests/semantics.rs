//! End-to-end scenarios over real UDP sockets: one server task per test,
//! driven by the retry client or by raw datagrams where byte-identical
//! replay matters.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;

use huddle::client::RetryClient;
use huddle::dedup::Semantics;
use huddle::model::WeekTime;
use huddle::server::ServerState;
use huddle::wire::{self, OP_CALLBACK, Request};

// ── Test infrastructure ──────────────────────────────────────

async fn start_server(semantics: Semantics) -> (Arc<ServerState>, SocketAddr) {
    let state = ServerState::bind("127.0.0.1:0", semantics).await.unwrap();
    let addr = state.local_addr().unwrap();
    tokio::spawn(state.clone().run());
    (state, addr)
}

async fn client_for(addr: SocketAddr) -> RetryClient {
    RetryClient::connect(addr, Duration::from_secs(2), false)
        .await
        .unwrap()
}

fn wt(day: u8, hour: u8, min: u8) -> WeekTime {
    WeekTime { day, hour, min }
}

fn booked_id(data: &str) -> String {
    data.split("ID=").nth(1).expect("book reply carries ID=").to_string()
}

/// Send raw bytes and await the raw reply bytes.
async fn raw_roundtrip(socket: &UdpSocket, addr: SocketAddr, bytes: &[u8]) -> Vec<u8> {
    socket.send_to(bytes, addr).await.unwrap();
    let mut buf = [0u8; 2048];
    let (n, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("reply within deadline")
        .unwrap();
    buf[..n].to_vec()
}

// ── Scenarios ────────────────────────────────────────────────

#[tokio::test]
async fn query_miss() {
    let (_state, addr) = start_server(Semantics::AtLeastOnce).await;
    let mut client = client_for(addr).await;

    let reply = client
        .call(&Request::Query {
            facility: "Ghost".into(),
            days: vec![0],
        })
        .await
        .unwrap();
    assert_eq!(reply.status, 0);
    assert!(reply.data.starts_with("Error: Facility 'Ghost' not found"));
}

#[tokio::test]
async fn book_then_conflict() {
    let (_state, addr) = start_server(Semantics::AtLeastOnce).await;
    let mut client = client_for(addr).await;

    let first = client
        .call(&Request::Book {
            facility: "RoomA".into(),
            start: wt(0, 11, 0),
            end: wt(0, 12, 0),
        })
        .await
        .unwrap();
    assert_eq!(first.status, 0);
    assert!(first.data.contains("ID="));

    let second = client
        .call(&Request::Book {
            facility: "RoomA".into(),
            start: wt(0, 11, 30),
            end: wt(0, 12, 30),
        })
        .await
        .unwrap();
    assert_eq!(second.status, 1);
    assert!(second.data.contains("Time conflict"));
}

#[tokio::test]
async fn change_with_offset() {
    let (_state, addr) = start_server(Semantics::AtLeastOnce).await;
    let mut client = client_for(addr).await;

    let booked = client
        .call(&Request::Book {
            facility: "RoomA".into(),
            start: wt(1, 9, 0),
            end: wt(1, 10, 0),
        })
        .await
        .unwrap();
    assert_eq!(booked.status, 0);
    let id = booked_id(&booked.data);

    let changed = client
        .call(&Request::Change {
            confirmation_id: id.clone(),
            offset_min: 60,
        })
        .await
        .unwrap();
    assert_eq!(changed.status, 0);

    let queried = client
        .call(&Request::Query {
            facility: "RoomA".into(),
            days: vec![1],
        })
        .await
        .unwrap();
    assert_eq!(queried.status, 0);
    assert!(queried.data.contains(&format!("{id}: 10:00 to 11:00")));
}

#[tokio::test]
async fn cancel_idempotent() {
    let (_state, addr) = start_server(Semantics::AtLeastOnce).await;
    let mut client = client_for(addr).await;

    let booked = client
        .call(&Request::Book {
            facility: "RoomA".into(),
            start: wt(3, 11, 0),
            end: wt(3, 12, 0),
        })
        .await
        .unwrap();
    let id = booked_id(&booked.data);

    let first = client
        .call(&Request::Cancel {
            confirmation_id: id.clone(),
        })
        .await
        .unwrap();
    assert_eq!(first.status, 0);

    // Fresh request id: the operation itself is idempotent
    let second = client
        .call(&Request::Cancel {
            confirmation_id: id.clone(),
        })
        .await
        .unwrap();
    assert_eq!(second.status, 0);
    assert!(second.data.contains("already canceled?"));
}

#[tokio::test]
async fn cancel_replay_returns_cached_bytes() {
    let (_state, addr) = start_server(Semantics::AtMostOnce).await;
    let mut client = client_for(addr).await;

    let booked = client
        .call(&Request::Book {
            facility: "RoomA".into(),
            start: wt(3, 11, 0),
            end: wt(3, 12, 0),
        })
        .await
        .unwrap();
    let id = booked_id(&booked.data);

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let datagram = wire::encode_request(
        71,
        &Request::Cancel {
            confirmation_id: id,
        },
    )
    .unwrap();

    let first = raw_roundtrip(&socket, addr, &datagram).await;
    let second = raw_roundtrip(&socket, addr, &datagram).await;
    assert_eq!(first, second); // cached reply bytes returned verbatim
}

#[tokio::test]
async fn add_participant_replays_under_at_least_once() {
    let (state, addr) = start_server(Semantics::AtLeastOnce).await;
    let mut client = client_for(addr).await;

    let booked = client
        .call(&Request::Book {
            facility: "Lab1".into(),
            start: wt(3, 10, 0),
            end: wt(3, 11, 0),
        })
        .await
        .unwrap();
    let id = booked_id(&booked.data);

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let datagram = wire::encode_request(
        5,
        &Request::AddParticipant {
            confirmation_id: id.clone(),
            participant: "alice".into(),
        },
    )
    .unwrap();

    raw_roundtrip(&socket, addr, &datagram).await;
    assert_eq!(
        state.engine.booking(&id).await.unwrap().participants,
        vec!["alice"]
    );

    // The identical datagram executes again
    raw_roundtrip(&socket, addr, &datagram).await;
    assert_eq!(
        state.engine.booking(&id).await.unwrap().participants,
        vec!["alice", "alice"]
    );
}

#[tokio::test]
async fn add_participant_suppressed_under_at_most_once() {
    let (state, addr) = start_server(Semantics::AtMostOnce).await;
    let mut client = client_for(addr).await;

    let booked = client
        .call(&Request::Book {
            facility: "Lab1".into(),
            start: wt(3, 10, 0),
            end: wt(3, 11, 0),
        })
        .await
        .unwrap();
    let id = booked_id(&booked.data);

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let datagram = wire::encode_request(
        5,
        &Request::AddParticipant {
            confirmation_id: id.clone(),
            participant: "alice".into(),
        },
    )
    .unwrap();

    let first = raw_roundtrip(&socket, addr, &datagram).await;
    let second = raw_roundtrip(&socket, addr, &datagram).await;

    assert_eq!(first, second);
    assert_eq!(
        state.engine.booking(&id).await.unwrap().participants,
        vec!["alice"]
    );
}

#[tokio::test]
async fn monitor_fanout() {
    let (_state, addr) = start_server(Semantics::AtLeastOnce).await;

    // Client M registers for RoomA updates
    let mut monitor_client = client_for(addr).await;
    let registered = monitor_client
        .call(&Request::Monitor {
            facility: "RoomA".into(),
            period_secs: 60,
        })
        .await
        .unwrap();
    assert_eq!(registered.status, 0);

    // Client W books RoomA
    let mut worker = client_for(addr).await;
    let booked = worker
        .call(&Request::Book {
            facility: "RoomA".into(),
            start: wt(2, 14, 0),
            end: wt(2, 15, 0),
        })
        .await
        .unwrap();
    assert_eq!(booked.status, 0);
    let id = booked_id(&booked.data);

    // M receives the callback frame
    let mut callback = None;
    for _ in 0..10 {
        if let Some(frame) = monitor_client
            .recv_frame(Duration::from_millis(500))
            .await
            .unwrap()
            && frame.opcode == OP_CALLBACK
        {
            callback = Some(frame);
            break;
        }
    }
    let callback = callback.expect("monitor callback within the period");
    assert_eq!(callback.request_id, 0);
    assert_eq!(callback.status, 0);
    assert!(callback.data.contains("Facility=RoomA"));
    assert!(callback.data.contains(&id));
}

#[tokio::test]
async fn monitor_unknown_facility_rejected() {
    let (_state, addr) = start_server(Semantics::AtLeastOnce).await;
    let mut client = client_for(addr).await;

    let reply = client
        .call(&Request::Monitor {
            facility: "Ghost".into(),
            period_secs: 60,
        })
        .await
        .unwrap();
    assert_eq!(reply.status, -1);
    assert!(reply.data.contains("not found"));
}

#[tokio::test]
async fn expired_monitor_gets_no_callback() {
    let (_state, addr) = start_server(Semantics::AtLeastOnce).await;

    let mut monitor_client = client_for(addr).await;
    let registered = monitor_client
        .call(&Request::Monitor {
            facility: "RoomA".into(),
            period_secs: 0, // expires immediately
        })
        .await
        .unwrap();
    assert_eq!(registered.status, 0);

    let mut worker = client_for(addr).await;
    worker
        .call(&Request::Book {
            facility: "RoomA".into(),
            start: wt(2, 14, 0),
            end: wt(2, 15, 0),
        })
        .await
        .unwrap();

    let frame = monitor_client
        .recv_frame(Duration::from_millis(500))
        .await
        .unwrap();
    assert!(frame.is_none());
}
