//! Integration tests for the room server
//!
//! These tests run a real listener on loopback and talk to it over TCP the
//! way game clients do.

use server::battlefield::RoomState;
use server::config::ServerConfig;
use server::network::Server;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

fn fast_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        read_timeout: Duration::from_millis(20),
        send_timeout: Duration::from_millis(500),
        liveness_timeout: Duration::from_secs(30),
        tick_interval: Duration::from_millis(5),
        admission_poll: Duration::from_millis(10),
        ..ServerConfig::default()
    }
}

async fn start_server(config: ServerConfig) -> (Server, SocketAddr) {
    let server = Server::new(config).unwrap();
    let addr = server.begin_listening().await.unwrap();
    (server, addr)
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Collects everything the server sends until `needle` shows up
async fn read_until(stream: &mut TcpStream, needle: &str) -> String {
    let mut seen = String::new();
    let mut buffer = [0u8; 4096];
    let deadline = Instant::now() + Duration::from_secs(5);
    while !seen.contains(needle) && Instant::now() < deadline {
        if let Ok(Ok(len)) = timeout(Duration::from_millis(50), stream.read(&mut buffer)).await {
            if len == 0 {
                break;
            }
            seen.push_str(&String::from_utf8_lossy(&buffer[..len]));
        }
    }
    seen
}

/// MATCHMAKING TESTS
mod placement_tests {
    use super::*;

    /// Two players share the first room; the third opens a second one
    #[tokio::test]
    async fn third_player_opens_second_room() {
        let (server, addr) = start_server(fast_config()).await;

        let mut clients = Vec::new();
        for expected in 1..=3 {
            clients.push(TcpStream::connect(addr).await.unwrap());
            assert!(wait_until(|| server.connected_players() == expected).await);
        }

        let rooms = server.rooms();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].players.len(), 2);
        assert_eq!(rooms[1].players.len(), 1);
        assert!(rooms.iter().all(|room| room.state == RoomState::Waiting));
    }

    /// Waiting players receive the waiting frame with their default names
    #[tokio::test]
    async fn waiting_frame_lists_players() {
        let (_server, addr) = start_server(fast_config()).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let frames = read_until(&mut client, "Player_0").await;
        assert!(frames.contains("waiting|0|Player_0|1|0\n"), "got {frames:?}");
    }

    /// A record sent by one player reaches everyone else in the room
    #[tokio::test]
    async fn record_update_is_relayed() {
        let (server, addr) = start_server(fast_config()).await;

        let mut alice = TcpStream::connect(addr).await.unwrap();
        assert!(wait_until(|| server.connected_players() == 1).await);
        let mut bob = TcpStream::connect(addr).await.unwrap();
        assert!(wait_until(|| server.connected_players() == 2).await);

        alice.write_all(b"0|Alice|1|150").await.unwrap();

        let frames = read_until(&mut bob, "Alice").await;
        assert!(frames.contains("0|Alice|1|150"), "got {frames:?}");
    }
}

/// MATCH LIFECYCLE TESTS
mod match_tests {
    use super::*;

    /// Everyone ready in a full room starts the match exactly once
    #[tokio::test]
    async fn ready_players_start_match() {
        let (server, addr) = start_server(fast_config()).await;

        let mut alice = TcpStream::connect(addr).await.unwrap();
        assert!(wait_until(|| server.connected_players() == 1).await);
        let mut bob = TcpStream::connect(addr).await.unwrap();
        assert!(wait_until(|| server.connected_players() == 2).await);

        alice.write_all(b"ready").await.unwrap();
        bob.write_all(b"ready").await.unwrap();

        assert!(read_until(&mut alice, "start").await.contains("start|"));
        assert!(read_until(&mut bob, "playing").await.contains("playing|"));
        assert_eq!(server.rooms()[0].state, RoomState::Playing);
    }

    /// The last player alive wins and the room closes behind the match
    #[tokio::test]
    async fn match_ends_with_single_survivor() {
        let (server, addr) = start_server(fast_config()).await;

        let mut alice = TcpStream::connect(addr).await.unwrap();
        assert!(wait_until(|| server.connected_players() == 1).await);
        let mut bob = TcpStream::connect(addr).await.unwrap();
        assert!(wait_until(|| server.connected_players() == 2).await);

        alice.write_all(b"ready").await.unwrap();
        bob.write_all(b"ready").await.unwrap();
        read_until(&mut alice, "start").await;

        alice.write_all(b"0|Alice|0|10").await.unwrap();

        assert!(wait_until(|| server.connected_players() == 0).await);
        assert!(server.rooms().iter().all(|room| room.closed));
    }
}

/// ADMISSION TESTS
mod admission_tests {
    use super::*;

    /// A full server leaves newcomers queued until a slot frees up
    #[tokio::test]
    async fn full_server_defers_new_players() {
        let config = ServerConfig {
            max_players: 1,
            ..fast_config()
        };
        let (server, addr) = start_server(config).await;

        let first = TcpStream::connect(addr).await.unwrap();
        assert!(wait_until(|| server.connected_players() == 1).await);
        assert!(server.is_full());

        let mut second = TcpStream::connect(addr).await.unwrap();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(server.connected_players(), 1);
        let mut buffer = [0u8; 64];
        assert!(timeout(Duration::from_millis(100), second.read(&mut buffer))
            .await
            .is_err());

        drop(first);

        let frames = read_until(&mut second, "Player_1").await;
        assert!(frames.contains("waiting|1|Player_1|1|0"), "got {frames:?}");
        assert_eq!(server.connected_players(), 1);
    }

    /// Stopping the listener keeps seated players connected
    #[tokio::test]
    async fn stop_keeps_existing_players() {
        let (server, addr) = start_server(fast_config()).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        assert!(wait_until(|| server.connected_players() == 1).await);

        server.stop().unwrap();
        assert!(!server.is_listening());

        read_until(&mut client, "waiting").await;
        let frames = read_until(&mut client, "waiting").await;
        assert!(frames.contains("waiting"));
        assert_eq!(server.connected_players(), 1);
    }
}
