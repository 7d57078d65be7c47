//! Wire protocol for Slipstream.
//!
//! This crate defines the "language" that racing clients and the server
//! speak:
//!
//! - **Types** ([`PlayerNumber`], [`KartTelemetry`], the protocol
//!   constants) — the values that travel on the wire.
//! - **Commands** ([`ClientCommand`], [`ServerCommand`]) — every verb in
//!   the protocol, with `FromStr`/`Display` implementations for the
//!   newline-terminated, space-separated text format.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while parsing.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw lines) and the server's
//! dispatch loop. It doesn't know about connections, lobbies, or races —
//! it only knows how to turn a line of text into a command and back.
//!
//! ```text
//! Transport (lines) → Protocol (commands) → Dispatch (lobby/race state)
//! ```
//!
//! Parsing never panics and never closes a connection: a bad line is a
//! value-level error the caller logs and drops.

mod command;
mod error;
mod types;

pub use command::{ClientCommand, ServerCommand};
pub use error::ProtocolError;
pub use types::{
    KartTelemetry, PlayerNumber, DEFAULT_PORT, KART_OPTIONS, MAP_OPTIONS,
    MAX_PLAYERS, RANDOM_MAP,
};
