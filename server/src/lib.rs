//! # Round Arbiter Server Library
//!
//! This library provides the authoritative side of a small cooperative
//! sorting game. The server owns every piece of replicated state, decides
//! every contested request, and broadcasts the outcome to connected
//! observers.
//!
//! ## Core Responsibilities
//!
//! ### Round Lifecycle
//! A round moves from `Idle` to `Running` when any participant asks for it,
//! counts down on the server tick, and ends when the timer reaches zero. At
//! the end the score is compared against the persisted best score, which is
//! updated and saved when beaten.
//!
//! ### Scoring
//! Participants ask the server to score an item into a receptacle. Each item
//! is consumed at most once per round no matter how many clients report it,
//! and only a matching category adds points.
//!
//! ### Exclusive Control
//! Every spawned object carries a lock. Grabs are granted only while the
//! lock is free, control of the object moves to the holder, and a
//! disconnecting client releases everything it held in the same event.
//!
//! ## Architecture Design
//!
//! ### Single Authority Loop
//! All requests are applied one at a time in arrival order by a single event
//! loop. Nothing outside that loop mutates replicated state, so the
//! arbitration logic itself needs no locking.
//!
//! ### UDP-Based Communication
//! Uses UDP sockets with bincode packets. The requester of every request is
//! derived from the sender address, never from the payload.
//!
//! ## Module Organization
//!
//! ### Round Module (`round`)
//! Round state machine, scoring and best-score handling on top of the
//! replicated session cells.
//!
//! ### Arbiter Module (`arbiter`)
//! Exclusive lock arbitration and control transfer per object.
//!
//! ### Router Module (`router`)
//! Turns requests into state changes and outgoing dispatches.
//!
//! ### Network Module (`network`)
//! Socket tasks, client tracking and the authority loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "127.0.0.1:8080".to_string(),
//!         ..ServerConfig::default()
//!     };
//!
//!     // Loads the best score, starts the first round and serves clients
//!     // until shut down.
//!     let mut server = Server::new(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server uses an event-driven architecture with internal async tasks that handle:
//! - **Network Receiver**: Continuously listens for incoming packets
//! - **Network Sender**: Processes outgoing packet queue and broadcasts
//! - **Timeout Checker**: Reports silent clients so their locks can be released
//! - **Authority Loop**: Applies requests and advances the round timer

pub mod arbiter;
pub mod client_manager;
pub mod config;
pub mod error;
pub mod guard;
pub mod network;
pub mod persistence;
pub mod registry;
pub mod round;
pub mod router;
pub mod spawner;
pub mod world;
