//! # Arena Server Library
//!
//! Authoritative server for the arena shooter. It owns the only writable copy
//! of the replicated state, validates every client command, runs the
//! fixed-rate simulation and streams state changes, entity lifecycle events
//! and cosmetic notifications back to clients over UDP.
//!
//! ## Architecture
//!
//! A single task owns the [`game::GameState`] and is the only place state is
//! mutated. Three helper tasks talk to it over unbounded channels:
//! - **Network Receiver**: decodes datagrams and forwards them to the main loop
//! - **Network Sender**: serializes and sends queued packets, unicast or broadcast
//! - **Timeout Checker**: drops clients that have gone silent
//!
//! Commands are queued as they arrive and applied at the start of the next
//! tick in arrival order. Each tick then moves players, platforms and
//! bullets, resolves hits and pickups, expires timers and writes the result
//! into the replicated store, whose outbox becomes the tick's state updates.
//!
//! ## Modules
//!
//! - `client_manager`: connected clients, command queues, acks and timeouts
//! - `config`: command-line flags and the resolved [`config::ServerConfig`]
//! - `context`: spawn points, color pool, rng and the notification outbox
//! - `entity`: entity id allocation and spawn/despawn bookkeeping
//! - `error`: [`error::ServerError`]
//! - `game`: the simulation and its entities
//! - `network`: UDP transport, handshake and the main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig::default()).await?;
//!     let shutdown = server.shutdown_handle();
//!
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.shutdown();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod game;
pub mod network;

pub use error::ServerError;
