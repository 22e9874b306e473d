//! # Session Server Library
//!
//! This library hosts one multiplayer session over UDP. One player's machine
//! runs the server; every participant, the host included, talks to it with
//! the datagrams defined in the `protocol` crate.
//!
//! ## Core Responsibilities
//!
//! ### Transport
//! Binds a UDP socket (ephemeral ports supported), receives datagrams and
//! decodes each one as a `Message`. Malformed datagrams are reported through
//! the caller's [`Logger`] and dropped; they never end the session.
//!
//! ### Player Slots
//! The [`registry::PlayerRegistry`] keeps up to sixteen players, each with its
//! last reported `PlayerState`, skin and peer address. Joins and leaves
//! arriving over the wire update it; everything else is relayed as-is to the
//! other players.
//!
//! ### Lifecycle
//! A server is created, runs exactly one receive loop, stops and is finally
//! disposed. The loop stops when its cancellation token fires (a normal
//! shutdown) or when it faults. Either way the socket is released, the
//! registry is cleared and the stopped event carries the [`StopReason`]
//! exactly once.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! [`Server`], its receive loop and message dispatch, plus [`start`] and
//! [`ServerHandle`] for callers that just want a running session.
//!
//! ### Registry Module (`registry`)
//! Fixed-capacity player table with per-player cancellation tokens.
//!
//! ### Config Module (`config`)
//! Bind address and buffer sizing, and the command line of the dedicated
//! server binary.
//!
//! ### Logger Module (`logger`)
//! The four-level sink the server reports through.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{start, LogFacade, ServerConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let token = CancellationToken::new();
//!     let handle = start(&ServerConfig::local(), &token, Arc::new(LogFacade)).await?;
//!     println!("Hosting on port {}", handle.port());
//!
//!     // Later, e.g. from the pause menu
//!     handle.stop();
//!     println!("Stopped: {:?}", handle.stopped().await);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logger;
pub mod network;
pub mod registry;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use logger::{LogFacade, Logger, SilentLogger};
pub use network::{start, Server, ServerHandle, ServerState, StopReason};
pub use registry::{Player, PlayerRegistry, MAX_PLAYERS};
