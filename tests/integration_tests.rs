//! Integration tests for the game server
//!
//! These tests boot a real server on loopback sockets and play whole games
//! over the datagram and stream channels.

use server::engine::Engine;
use server::network::Server;
use server::store::{FileStore, GameStore, MemoryStore};
use server::transfer::read_framed;
use shared::stream::TransferStatus;
use shared::{FrameHeader, GameConfig, MAX_BUFFER_SIZE};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{sleep, timeout};

struct Running {
    udp: SocketAddr,
    tcp: SocketAddr,
}

async fn boot<S: GameStore + 'static>(store: S, rules: GameConfig) -> Running {
    let engine = Engine::new(store, rules);
    let mut server = Server::bind("127.0.0.1:0", "127.0.0.1:0", engine, false)
        .await
        .expect("Failed to bind server");
    let running = Running {
        udp: server.udp_addr(),
        tcp: server.tcp_addr(),
    };
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    running
}

async fn boot_on_disk(dir: &Path) -> Running {
    boot(FileStore::open(dir).unwrap(), GameConfig::default()).await
}

async fn client() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind client socket")
}

async fn exchange(socket: &UdpSocket, server: &Running, request: &str) -> String {
    socket.send_to(request.as_bytes(), server.udp).await.unwrap();
    let mut buf = [0u8; MAX_BUFFER_SIZE];
    let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("Timed out waiting for reply")
        .unwrap();
    String::from_utf8(buf[..len].to_vec()).unwrap()
}

async fn transfer(server: &Running, request: &str) -> (FrameHeader, String) {
    let mut stream = TcpStream::connect(server.tcp).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut reader = BufReader::new(stream);
    let (header, payload) = read_framed(&mut reader).await.unwrap();
    (header, String::from_utf8(payload).unwrap())
}

/// GAMEPLAY TESTS
mod gameplay_tests {
    use super::*;

    /// Plays a debug game to a win and checks the leaderboard
    #[tokio::test]
    async fn debug_game_is_won_and_ranked() {
        let server = boot(MemoryStore::new(), GameConfig::default()).await;
        let socket = client().await;

        assert_eq!(exchange(&socket, &server, "DBG 111111 600 R G B Y\n").await, "RDB OK\n");
        assert_eq!(exchange(&socket, &server, "TRY 111111 Y B G R 1\n").await, "RTR OK 1 0 4\n");
        assert_eq!(exchange(&socket, &server, "TRY 111111 R G B Y 2\n").await, "RTR OK 2 4 0\n");

        let (header, body) = transfer(&server, "SSB\n").await;
        assert_eq!(header.status, TransferStatus::Ok);
        let line = body.lines().next().unwrap();
        assert!(line.starts_with("1 095 111111 RGBY 2 DEBUG"), "{}", line);
    }

    /// Runs a game out of attempts
    #[tokio::test]
    async fn attempts_run_out() {
        let rules = GameConfig {
            max_trials: 2,
            ..GameConfig::default()
        };
        let server = boot(MemoryStore::new(), rules).await;
        let socket = client().await;

        exchange(&socket, &server, "DBG 222222 600 O O P P\n").await;
        assert_eq!(exchange(&socket, &server, "TRY 222222 R R R R 1\n").await, "RTR OK 1 0 0\n");
        assert_eq!(exchange(&socket, &server, "TRY 222222 G G G G 2\n").await, "RTR ENT O O P P\n");
        assert_eq!(exchange(&socket, &server, "TRY 222222 B B B B 3\n").await, "RTR ERR\n");

        let (header, _) = transfer(&server, "SSB\n").await;
        assert_eq!(header.to_string(), "RSS EMPTY\n");
    }

    /// Lets a short game expire between two guesses
    #[tokio::test]
    async fn game_times_out() {
        let server = boot(MemoryStore::new(), GameConfig::default()).await;
        let socket = client().await;

        exchange(&socket, &server, "DBG 333333 1 R G B Y\n").await;
        sleep(Duration::from_millis(1100)).await;
        assert_eq!(exchange(&socket, &server, "TRY 333333 R R R R 1\n").await, "RTR ETM R G B Y\n");
        assert_eq!(exchange(&socket, &server, "TRY 333333 R R R R 1\n").await, "RTR NOK\n");
        assert_eq!(exchange(&socket, &server, "SNG 333333 60\n").await, "RSG OK\n");
    }

    /// A lost reply is recovered by resending the same guess
    #[tokio::test]
    async fn retransmitted_guess_is_answered_again() {
        let server = boot(MemoryStore::new(), GameConfig::default()).await;
        let socket = client().await;

        exchange(&socket, &server, "DBG 444444 600 R G B Y\n").await;
        let first = exchange(&socket, &server, "TRY 444444 B B Y Y 1\n").await;
        let again = exchange(&socket, &server, "TRY 444444 B B Y Y 1\n").await;
        assert_eq!(first, again);
        assert_eq!(exchange(&socket, &server, "TRY 444444 B B Y Y 2\n").await, "RTR DUP\n");

        let (header, body) = transfer(&server, "STR 444444\n").await;
        assert_eq!(header.status, TransferStatus::Act);
        assert_eq!(body.matches("nB=").count(), 1);
    }

    /// Several players interleave without disturbing each other
    #[tokio::test]
    async fn concurrent_players() {
        let server = boot(MemoryStore::new(), GameConfig::default()).await;
        let mut sockets = Vec::new();
        for i in 0..5 {
            let socket = client().await;
            let request = format!("DBG 50000{} 600 R G B Y\n", i);
            assert_eq!(exchange(&socket, &server, &request).await, "RDB OK\n");
            sockets.push(socket);
        }

        let mut handles = Vec::new();
        for (i, socket) in sockets.into_iter().enumerate() {
            let server = Running {
                udp: server.udp,
                tcp: server.tcp,
            };
            handles.push(tokio::spawn(async move {
                let request = format!("TRY 50000{} R G B Y 1\n", i);
                exchange(&socket, &server, &request).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), "RTR OK 1 4 0\n");
        }

        let (_, body) = transfer(&server, "SSB\n").await;
        assert_eq!(body.lines().count(), 5);
    }
}

/// TRANSFER TESTS
mod transfer_tests {
    use super::*;

    #[tokio::test]
    async fn unknown_player_has_no_transcript() {
        let server = boot(MemoryStore::new(), GameConfig::default()).await;
        let (header, body) = transfer(&server, "STR 999999\n").await;
        assert_eq!(header.to_string(), "RST NOK\n");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn malformed_stream_requests() {
        let server = boot(MemoryStore::new(), GameConfig::default()).await;
        let (header, _) = transfer(&server, "STR abc\n").await;
        assert_eq!(header.to_string(), "RST ERR\n");
        let (header, _) = transfer(&server, "HELLO\n").await;
        assert_eq!(header.to_string(), "ERR\n");
    }

    /// Finished games and scores survive a server restart
    #[tokio::test]
    async fn archives_survive_restart() {
        let dir = TempDir::new().unwrap();

        {
            let server = boot_on_disk(dir.path()).await;
            let socket = client().await;
            exchange(&socket, &server, "DBG 777777 600 P O Y G\n").await;
            exchange(&socket, &server, "TRY 777777 P O Y G 1\n").await;
            exchange(&socket, &server, "DBG 888888 600 P O Y G\n").await;
            exchange(&socket, &server, "QUT 888888\n").await;
        }

        let server = boot_on_disk(dir.path()).await;

        let (header, body) = transfer(&server, "STR 777777\n").await;
        assert_eq!(header.status, TransferStatus::Fin);
        assert!(body.contains("Secret: POYG"));
        assert!(body.contains("WIN"));

        let (header, body) = transfer(&server, "STR 888888\n").await;
        assert_eq!(header.status, TransferStatus::Fin);
        assert!(body.contains("QUIT"));

        let (header, body) = transfer(&server, "SSB\n").await;
        assert_eq!(header.status, TransferStatus::Ok);
        assert_eq!(body.lines().count(), 1);
        assert!(body.starts_with("1 100 777777 POYG 1 DEBUG"));

        assert!(dir.path().join("GAMES").join("777777").is_dir());
        assert!(!dir.path().join("GAMES").join("GAME_777777.txt").exists());
    }
}
