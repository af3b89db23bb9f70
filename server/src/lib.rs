//! # Game Server Library
//!
//! The room server for up to six players. It assigns slots, checks
//! registrations, relays fields, chat and specials between players, decides
//! when a game is over and keeps the win-list.
//!
//! ## Architecture
//!
//! A single event loop in [`network::Server`] owns all state. Each socket
//! gets a reader task that forwards complete lines to the loop and a writer
//! task that sends whatever the loop queues for it. The loop hands every
//! line to [`session::Session`], a plain state machine with no I/O, and then
//! delivers the lines the session queued in response. Messages from one
//! player are therefore handled strictly in arrival order.
//!
//! ## Modules
//!
//! - `roster`: the six slots and who holds them
//! - `session`: registration, relay rules, game start/stop and scoring
//! - `store`: the settings and win-list file
//! - `network`: TCP accept loop and per-connection tasks
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::store::ConfigStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = ConfigStore::new(ConfigStore::default_path());
//!     let settings = store.load()?;
//!     let mut server = Server::new("0.0.0.0:31457", store, settings).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod roster;
pub mod session;
pub mod store;
