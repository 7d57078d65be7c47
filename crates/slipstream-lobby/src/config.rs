//! Lobby configuration.

use serde::{Deserialize, Serialize};
use slipstream_protocol::{KART_OPTIONS, MAX_PLAYERS};

/// Configuration for the lobby.
///
/// The defaults match the deployed racing clients: six slots, seven kart
/// liveries, map 0 preselected. Tests shrink these to exercise edge
/// cases without twelve fixture players.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyConfig {
    /// Number of player slots; numbers are drawn from {1..max_players}.
    pub max_players: usize,

    /// Number of selectable kart liveries; choices are 0..kart_options.
    pub kart_options: u8,

    /// The shared map choice a fresh lobby starts with.
    pub default_map: u8,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            max_players: MAX_PLAYERS,
            kart_options: KART_OPTIONS,
            default_map: 0,
        }
    }
}
