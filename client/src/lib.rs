//! # Tetrinet Client Library
//!
//! The client side of a six-player falling-block game played over the
//! tetrinet line protocol. Everything that decides what happens on the
//! player's own field lives here; the server only relays.
//!
//! ## Module Organization
//!
//! ### Engine Module (`engine`)
//! The local game itself:
//! - Piece spawning, falling, locking and line clears
//! - Level curve and fall timing
//! - Special block effects on the player's field
//! - Field updates and attacks queued for the server
//!
//! ### Inventory Module (`inventory`)
//! The queue of collected special blocks, bounded by the capacity each game
//! announces.
//!
//! ### Controller Module (`controller`)
//! Turns server lines and player actions into engine calls, and keeps the
//! roster, teams, win-list and the partyline, game message and attack logs.
//!
//! ### Input Module (`input`)
//! Maps typed terminal lines to player actions.
//!
//! ### Display Module (`display`)
//! The output sink the controller reports to, with a plain text
//! implementation.
//!
//! ### Network Module (`network`)
//! Connects, registers and runs the event loop over the server socket,
//! terminal input and the fall timer.
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::engine::EngineOptions;
//! use client::network::{Client, ClientOptions};
//!
//! # async fn play() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ClientOptions {
//!     nick: "alice".to_string(),
//!     server: "localhost".to_string(),
//!     port: shared::DEFAULT_PORT,
//!     engine: EngineOptions::default(),
//!     plain: false,
//!     draw_fields: true,
//! };
//! let mut client = Client::connect(&options).await?;
//! client.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod display;
pub mod engine;
pub mod input;
pub mod inventory;
pub mod network;
