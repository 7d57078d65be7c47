//! Pre-game lobby state for Slipstream.
//!
//! The lobby tracks everything that happens between "socket accepted" and
//! "race started": slot allocation from the {1..6} number pool, kart
//! choice negotiation, the shared map choice, and the ready-check that
//! decides when a race may begin.
//!
//! This crate is pure state — it performs no I/O and holds no locks.
//! The server wraps one [`Lobby`] in a mutex, keeps its critical sections
//! short, and broadcasts the copy-out values each operation returns.
//!
//! # Key types
//!
//! - [`Lobby`] — the state machine itself
//! - [`LobbyConfig`] — pool size, kart option count, default map
//! - [`Joined`] — what a successful join hands back to the joiner
//! - [`ReadyCheck`] — outcome of a ready toggle (pending, or start with a
//!   [`LobbySnapshot`])
//! - [`LobbyError`] — join refusal and misuse errors

mod config;
mod error;
mod lobby;

pub use config::LobbyConfig;
pub use error::LobbyError;
pub use lobby::{Joined, Lobby, LobbySnapshot, ReadyCheck};
