//! Active race-session state for Slipstream.
//!
//! A [`RaceSession`] is created from a [`LobbySnapshot`] the instant a
//! lobby's ready-check passes, and lives for exactly one race: it holds
//! the frozen roster, the resolved map, and the weather draw, and decides
//! who each telemetry report fans out to. It is destroyed on an explicit
//! end-of-game or when the roster empties.
//!
//! Like the lobby crate, this is pure state with no I/O — the server
//! owns one session behind a mutex and does the actual sending.
//!
//! [`LobbySnapshot`]: slipstream_lobby::LobbySnapshot

mod config;
mod error;
mod session;

pub use config::RaceConfig;
pub use error::RaceError;
pub use session::{RaceSession, RaceStart, Removal};
