//! # Round Arbiter Client Library
//!
//! This library provides the observer side of the cooperative sorting game.
//! A client never decides anything on its own: it mirrors the state the
//! authority broadcasts and sends requests that the authority may grant,
//! deny or ignore.
//!
//! ## Architecture Overview
//!
//! ### Replicated State
//! Every server-owned value (round phase, timer, score, best score, the
//! new-best flag and one lock per object) has a read-only observer copy on
//! the client. Updates carry a version; stale or duplicated updates are
//! dropped so reordered datagrams still converge.
//!
//! ### Requests, Not Writes
//! Starting a round, scoring an item and grabbing or releasing an object are
//! all requests. The requester is identified by the server from the
//! transport, so the payload never names a client.
//!
//! ### Local Grab Check
//! A grab for an object whose lock is already held by another client is not
//! sent at all. A grab that is sent and later denied is cancelled locally.
//!
//! ## Module Organization
//!
//! ### Replica Module (`replica`)
//! Observer cells, known objects, controllers and change subscriptions.
//!
//! ### Commands Module (`commands`)
//! Parsing of console commands.
//!
//! ### Display Module (`display`)
//! Console formatting and the change reporters installed on the replica.
//!
//! ### Network Module (`network`)
//! UDP connection, heartbeat and the client event loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect to a local server without simulated latency
//!     let mut client = Client::new("127.0.0.1:8080", 0).await?;
//!
//!     // Reads commands from stdin until `quit`
//!     client.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod display;
pub mod network;
pub mod replica;
