//! # Arena Client Library
//!
//! Headless client for the arena server. It connects over UDP, keeps a
//! read-only mirror of the server's replicated store, tracks which entities
//! exist and drives its player with a seeded bot.
//!
//! The client never decides game outcomes. It sends commands and displays
//! (logs) whatever the server replicates back; commands the server rejects
//! simply have no visible effect.
//!
//! ## Modules
//!
//! - `game`: [`game::ClientGameState`], the mirror store, known entities and
//!   an observer recording our own player's health
//! - `input`: [`input::InputManager`], the sequenced command generator
//! - `network`: [`network::Client`], socket handling, heartbeats and the main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("127.0.0.1:8080", 0, 42).await?;
//!     client.run(Some(Duration::from_secs(30))).await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
