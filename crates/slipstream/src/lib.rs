//! # Slipstream
//!
//! Authoritative session server for a real-time multiplayer racing game.
//!
//! The server owns the pre-race lobby (player numbers, kart choices,
//! ready flags, map vote) and the in-race session (telemetry fan-out,
//! win/loss notification, teardown). Clients speak a newline-delimited
//! text protocol over TCP; every accepted connection runs in its own
//! Tokio task against shared lobby/race state.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slipstream::SlipstreamServer;
//!
//! # async fn run() -> Result<(), slipstream::ServerError> {
//! let server = SlipstreamServer::builder()
//!     .bind("0.0.0.0:5000")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod registry;
mod server;

pub use error::ServerError;
pub use registry::{PeerSender, PlayerSlot, Registry};
pub use server::{SlipstreamServer, SlipstreamServerBuilder};
