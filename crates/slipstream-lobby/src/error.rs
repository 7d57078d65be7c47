//! Error types for the lobby layer.

use slipstream_protocol::PlayerNumber;

/// Errors that can occur during lobby operations.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// Every slot in the number pool is taken.
    #[error("the lobby is full")]
    Full,

    /// The player is not a lobby member.
    ///
    /// Raised when a ready toggle or kart reassignment arrives from a
    /// connection that never joined. The offending command is dropped;
    /// the connection stays open.
    #[error("player {0} is not in the lobby")]
    NotJoined(PlayerNumber),
}
