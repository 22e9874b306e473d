//! Integration tests for the session transport
//!
//! These tests drive the protocol codecs and a real server over loopback UDP.

use assert_approx_eq::assert_approx_eq;
use protocol::{CodecError, Message, MessageType, PlayerState, Point3, State, MAX_PAYLOAD_SIZE};
use server::{start, PlayerRegistry, ServerConfig, ServerHandle, SilentLogger, StopReason, MAX_PLAYERS};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests a join message carrying a full player state survives the wire
    #[test]
    fn nested_join_message() {
        let state = PlayerState::new(
            State::Attacking,
            1.25,
            -0.5,
            true,
            3.75,
            Point3::new(10.0, -2.5, 0.125),
        );
        let datagram = Message::new(MessageType::PlayerJoin, state.encode())
            .encode()
            .unwrap();

        let message = Message::decode(&datagram).unwrap();
        assert_eq!(message.kind, MessageType::PlayerJoin);

        let decoded = PlayerState::decode(message.payload()).unwrap();
        assert_eq!(decoded.current, State::Attacking);
        assert_approx_eq!(decoded.facing, 1.25);
        assert_approx_eq!(decoded.look, -0.5);
        assert!(decoded.defending);
        assert_approx_eq!(decoded.timer, 3.75);
        assert_eq!(decoded.position, Point3::new(10.0, -2.5, 0.125));
    }

    /// Tests the exact byte layout of a chat message
    #[test]
    fn chat_message_layout() {
        let datagram = Message::new(MessageType::ChatNotify, "hi").encode().unwrap();
        assert_eq!(
            datagram,
            vec![0x95, 0x34, 0x17, 0x00, 4, 0, 0, 0, 2, 0, 0, 0, b'h', b'i']
        );
    }

    /// Tests that the largest payload is accepted and one more byte is not
    #[test]
    fn payload_size_limit() {
        let largest = Message::new(MessageType::ChatNotify, vec![7u8; MAX_PAYLOAD_SIZE]);
        let datagram = largest.encode().unwrap();
        assert_eq!(Message::decode(&datagram).unwrap(), largest);

        let oversized = Message::new(MessageType::ChatNotify, vec![7u8; MAX_PAYLOAD_SIZE + 1]);
        assert!(matches!(
            oversized.encode(),
            Err(CodecError::PayloadTooLarge { .. })
        ));
    }

    /// Tests that each structure refuses the others' bytes
    #[test]
    fn structures_are_not_interchangeable() {
        let point = Point3::new(1.0, 2.0, 3.0).encode();
        let state = PlayerState::default().encode();

        assert!(matches!(Message::decode(&point), Err(CodecError::BadMagic { .. })));
        assert!(matches!(Message::decode(&state), Err(CodecError::BadMagic { .. })));
        assert!(matches!(PlayerState::decode(&point), Err(CodecError::TooShort { .. })));
        assert!(matches!(Point3::decode(&state), Err(CodecError::BadMagic { .. })));
    }
}

/// SESSION INTEGRATION TESTS
mod session_tests {
    use super::*;

    async fn host() -> (ServerHandle, CancellationToken) {
        let token = CancellationToken::new();
        let handle = start(&ServerConfig::local(), &token, Arc::new(SilentLogger))
            .await
            .expect("Failed to start server");
        (handle, token)
    }

    async fn peer() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind peer socket")
    }

    async fn join(socket: &UdpSocket, handle: &ServerHandle, position: Point3) {
        let datagram = Message::new(MessageType::PlayerJoin, PlayerState::idle_at(position).encode())
            .encode()
            .unwrap();
        socket.send_to(&datagram, handle.local_addr()).await.unwrap();
    }

    async fn wait_for<F>(handle: &ServerHandle, mut check: F)
    where
        F: FnMut(&PlayerRegistry) -> bool,
    {
        timeout(WAIT, async {
            loop {
                if check(&*handle.server().registry().read().await) {
                    return;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Registry never reached the expected state");
    }

    async fn recv(socket: &UdpSocket) -> Message {
        let mut buf = [0u8; 2048];
        let (len, _) = timeout(WAIT, socket.recv_from(&mut buf))
            .await
            .expect("Timed out waiting for relay")
            .unwrap();
        Message::decode(&buf[..len]).unwrap()
    }

    /// Tests two servers get distinct ephemeral ports
    #[tokio::test]
    async fn ephemeral_ports_are_distinct() {
        let (first, _a) = host().await;
        let (second, _b) = host().await;
        assert_ne!(first.port(), 0);
        assert_ne!(second.port(), 0);
        assert_ne!(first.port(), second.port());
    }

    /// Tests a full session: join, relay, leave, shutdown
    #[tokio::test]
    async fn join_relay_leave_shutdown() {
        let (handle, token) = host().await;
        let host_peer = peer().await;
        let guest = peer().await;

        join(&host_peer, &handle, Point3::new(0.0, 0.0, 0.0)).await;
        wait_for(&handle, |r| r.len() == 1).await;
        join(&guest, &handle, Point3::new(5.0, 0.0, 5.0)).await;
        wait_for(&handle, |r| r.len() == 2).await;

        let relayed_join = recv(&host_peer).await;
        let guest_state = PlayerState::decode(relayed_join.payload()).unwrap();
        assert_eq!(guest_state.position, Point3::new(5.0, 0.0, 5.0));

        let ritual = Message::empty(MessageType::RitualPerform);
        guest
            .send_to(&ritual.encode().unwrap(), handle.local_addr())
            .await
            .unwrap();
        assert_eq!(recv(&host_peer).await, ritual);

        let left = Message::empty(MessageType::PlayerLeft).encode().unwrap();
        guest.send_to(&left, handle.local_addr()).await.unwrap();
        assert_eq!(recv(&host_peer).await.kind, MessageType::PlayerLeft);
        wait_for(&handle, |r| r.len() == 1).await;

        token.cancel();
        assert_eq!(
            timeout(WAIT, handle.join()).await.unwrap(),
            StopReason::NormalShutdown
        );
    }

    /// Tests that a seventeenth peer is refused
    #[tokio::test]
    async fn session_caps_at_sixteen_players() {
        let (handle, _token) = host().await;
        let mut peers = Vec::new();
        for _ in 0..MAX_PLAYERS {
            let socket = peer().await;
            join(&socket, &handle, Point3::default()).await;
            peers.push(socket);
        }
        wait_for(&handle, |r| r.len() == MAX_PLAYERS).await;

        let late = peer().await;
        join(&late, &handle, Point3::default()).await;
        // Once the chat sent after it comes back, the late join was handled
        let chat = Message::new(MessageType::ChatNotify, "ping").encode().unwrap();
        peers[0].send_to(&chat, handle.local_addr()).await.unwrap();
        while recv(&peers[1]).await.kind != MessageType::ChatNotify {}

        let late_addr = late.local_addr().unwrap();
        let registry = handle.server().registry().read().await;
        assert_eq!(registry.len(), MAX_PLAYERS);
        assert_eq!(registry.find_by_peer(late_addr), None);
    }

    /// Tests that stop frees the port for a new session
    #[tokio::test]
    async fn stopped_port_can_be_reused() {
        let (handle, _token) = host().await;
        let port = handle.port();
        handle.stop();
        assert_eq!(handle.join().await, StopReason::NormalShutdown);

        let config = ServerConfig::new("127.0.0.1".parse().unwrap(), port);
        let token = CancellationToken::new();
        let again = start(&config, &token, Arc::new(SilentLogger)).await.unwrap();
        assert_eq!(again.port(), port);
        again.stop();
    }
}

/// STRESS AND ERROR HANDLING TESTS
mod stress_tests {
    use super::*;

    /// Tests the loop survives a burst of malformed datagrams
    #[tokio::test]
    async fn malformed_datagram_flood() {
        let token = CancellationToken::new();
        let handle = start(&ServerConfig::local(), &token, Arc::new(SilentLogger))
            .await
            .unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let malformed: Vec<Vec<u8>> = vec![
            vec![],
            vec![0xFF; 3],
            vec![0x00; 12],
            // Valid magic, unknown type
            vec![0x95, 0x34, 0x17, 0x00, 9, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF],
            // Valid header, length beyond the datagram
            vec![0x95, 0x34, 0x17, 0x00, 4, 0, 0, 0, 100, 0, 0, 0, 1, 2],
            Point3::new(1.0, 1.0, 1.0).encode().to_vec(),
        ];
        for _ in 0..20 {
            for datagram in &malformed {
                socket.send_to(datagram, handle.local_addr()).await.unwrap();
            }
        }

        // Far larger than any valid message
        socket.send_to(&[0xEEu8; 4000], handle.local_addr()).await.unwrap();
        socket.send_to(&[0xEEu8; 60_000], handle.local_addr()).await.unwrap();

        let state = PlayerState::idle_at(Point3::new(2.0, 0.0, 2.0));
        let join = Message::new(MessageType::PlayerJoin, state.encode()).encode().unwrap();
        socket.send_to(&join, handle.local_addr()).await.unwrap();

        timeout(WAIT, async {
            while handle.server().registry().read().await.is_empty() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Server stopped handling datagrams");

        handle.stop();
        assert_eq!(handle.join().await, StopReason::NormalShutdown);
    }
}
