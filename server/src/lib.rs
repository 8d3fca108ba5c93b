//! # Game Server Library
//!
//! This library provides the authoritative server for a code-breaking game:
//! a player claims an id, the server picks a secret colour sequence and the
//! player guesses over datagrams until it wins, runs out of trials or runs out
//! of time. A stream channel serves game transcripts and a leaderboard.
//!
//! ## Core Responsibilities
//!
//! ### Game Sessions
//! The registry holds at most one game per player. Time is charged lazily on
//! every request for that player, so no background timer is needed.
//!
//! ### Protocol Handling
//! Each datagram is decoded, checked against the player's session and
//! answered with a single line. Trial numbering tolerates one retransmission
//! of the previous guess.
//!
//! ### Persistence
//! Every game leaves a transcript. A finished game is archived under its end
//! time and outcome, and a won game also leaves a score record.
//!
//! ## Architecture Design
//!
//! ### Single Owner Loop
//! The engine lives inside one task. Socket tasks never touch it directly:
//! they forward requests over a channel and, for stream transfers, wait on a
//! oneshot reply carrying the finished bytes.
//!
//! ## Module Organization
//!
//! - `config`: validation of the game rules supplied at startup
//! - `engine`: datagram verbs and their state transitions
//! - `network`: sockets, tasks and the owner loop
//! - `registry`: live sessions and their retirement
//! - `scoring`: score formula and leaderboard ranking
//! - `store`: transcript and score persistence
//! - `transfer`: stream channel replies
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::engine::Engine;
//! use server::network::Server;
//! use server::store::FileStore;
//! use shared::GameConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::new(FileStore::open(".")?, GameConfig::default());
//!     let mut server = Server::bind("0.0.0.0:58054", "0.0.0.0:58054", engine, false).await?;
//!
//!     // Runs until the process is stopped
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod network;
pub mod registry;
pub mod scoring;
pub mod store;
pub mod transfer;
