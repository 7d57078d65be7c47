//! Unified error type for the Slipstream server.

use slipstream_lobby::LobbyError;
use slipstream_protocol::ProtocolError;
use slipstream_race::RaceError;
use slipstream_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When embedding the server through the `slipstream` crate, you deal
/// with this single error type instead of importing errors from each
/// sub-crate. The `#[from]` attribute on each variant auto-generates
/// `From` impls, so the `?` operator converts sub-crate errors
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (unknown verb, bad arity, bad argument).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A lobby-level error (full, not joined).
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// A race-level error (session already active).
    #[error(transparent)]
    Race(#[from] RaceError),
}
