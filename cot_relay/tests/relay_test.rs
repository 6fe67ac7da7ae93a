// Integration tests for the relay server.
//
// Each test starts a relay on a loopback port, connects plain TCP clients
// through `RelayClient`, and exercises the externally observable contract:
// fan-out to every participant including the sender, reassembly across
// arbitrary chunk boundaries, discarding of partial messages on
// disconnect, and orderly shutdown. No payload is ever interpreted.

use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use cot_relay::client::RelayClient;
use cot_relay::server::{RelayConfig, RelayHandle, start_relay};

/// Start a relay on a loopback port chosen by the OS.
fn start_test_relay() -> (RelayHandle, SocketAddr) {
    let config = RelayConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..RelayConfig::default()
    };
    start_relay(config).unwrap()
}

/// Wait until the relay reports `expected` registered participants.
/// Connections are registered asynchronously, so tests must not send
/// until everyone they expect to receive has actually been added.
fn wait_for_participants(handle: &RelayHandle, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.participant_count() != expected {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {expected} participants (have {})",
            handle.participant_count()
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn recv_one(client: &RelayClient) -> Vec<u8> {
    client
        .recv_timeout(Duration::from_secs(5))
        .expect("timed out waiting for a broadcast")
}

#[test]
fn broadcast_reaches_all_participants_including_sender() {
    let (handle, addr) = start_test_relay();

    let mut alice = RelayClient::connect(addr).unwrap();
    let bob = RelayClient::connect(addr).unwrap();
    let carol = RelayClient::connect(addr).unwrap();
    wait_for_participants(&handle, 3);

    alice.send_event(b"<event>position update").unwrap();

    for client in [&alice, &bob, &carol] {
        assert_eq!(recv_one(client), b"<event>position update</event>");
    }

    handle.stop();
}

#[test]
fn reassembles_messages_split_across_chunks() {
    let (handle, addr) = start_test_relay();

    let mut sender = RelayClient::connect(addr).unwrap();
    let observer = RelayClient::connect(addr).unwrap();
    wait_for_participants(&handle, 2);

    // The terminator itself straddles a chunk boundary, and the final
    // chunk carries the tail of one message plus a whole second message.
    for chunk in [&b"<event>A"[..], b"B</eve", b"nt><event>C</event>"] {
        sender.send_raw(chunk).unwrap();
        std::thread::sleep(Duration::from_millis(20));
    }

    assert_eq!(recv_one(&observer), b"<event>AB</event>");
    assert_eq!(recv_one(&observer), b"<event>C</event>");
    // And the sender got its own messages back.
    assert_eq!(recv_one(&sender), b"<event>AB</event>");
    assert_eq!(recv_one(&sender), b"<event>C</event>");

    handle.stop();
}

#[test]
fn partial_message_is_discarded_on_disconnect() {
    let (handle, addr) = start_test_relay();

    let observer = RelayClient::connect(addr).unwrap();
    let mut quitter = RelayClient::connect(addr).unwrap();
    wait_for_participants(&handle, 2);

    // An unterminated fragment, then a hard disconnect.
    quitter.send_raw(b"<event>never finished").unwrap();
    std::thread::sleep(Duration::from_millis(50));
    drop(quitter);

    // The quitter is removed by a compaction pass...
    wait_for_participants(&handle, 1);

    // ...and its fragment is never broadcast: the next thing the observer
    // sees is its own message.
    let mut observer_w = RelayClient::connect(addr).unwrap();
    wait_for_participants(&handle, 2);
    observer_w.send_event(b"<event>fresh").unwrap();
    assert_eq!(recv_one(&observer), b"<event>fresh</event>");
    assert!(observer.poll().is_empty());

    handle.stop();
}

#[test]
fn remaining_participants_unaffected_by_dead_peer() {
    let (handle, addr) = start_test_relay();

    let mut alice = RelayClient::connect(addr).unwrap();
    let bob = RelayClient::connect(addr).unwrap();
    let carol = RelayClient::connect(addr).unwrap();
    wait_for_participants(&handle, 3);

    drop(bob);
    wait_for_participants(&handle, 2);

    alice.send_event(b"<event>still here").unwrap();
    assert_eq!(recv_one(&alice), b"<event>still here</event>");
    assert_eq!(recv_one(&carol), b"<event>still here</event>");

    handle.stop();
}

#[test]
fn consecutive_messages_arrive_in_order() {
    let (handle, addr) = start_test_relay();

    let mut sender = RelayClient::connect(addr).unwrap();
    let observer = RelayClient::connect(addr).unwrap();
    wait_for_participants(&handle, 2);

    // Several messages in one TCP write: one commit, many frames.
    sender
        .send_raw(b"<event>1</event><event>2</event><event>3</event>")
        .unwrap();

    assert_eq!(recv_one(&observer), b"<event>1</event>");
    assert_eq!(recv_one(&observer), b"<event>2</event>");
    assert_eq!(recv_one(&observer), b"<event>3</event>");

    handle.stop();
}

#[test]
fn shutdown_closes_client_connections() {
    let (handle, addr) = start_test_relay();

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    // Wait until the relay has registered the connection, so the forced
    // compaction has something to close.
    wait_for_participants(&handle, 1);

    handle.stop();

    // The forced compaction shuts the socket down; the client observes
    // an orderly close.
    let mut scratch = [0u8; 16];
    assert_eq!(stream.read(&mut scratch).unwrap(), 0);
}

#[test]
fn bind_failure_is_reported_at_startup() {
    let (handle, addr) = start_test_relay();

    // A second relay on the same port must fail to bind, before any loop
    // is entered.
    let config = RelayConfig {
        host: "127.0.0.1".into(),
        port: addr.port(),
        ..RelayConfig::default()
    };
    assert!(start_relay(config).is_err());

    handle.stop();
}
