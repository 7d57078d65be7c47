//! Race configuration.

use serde::{Deserialize, Serialize};
use slipstream_protocol::{MAP_OPTIONS, RANDOM_MAP};

/// Configuration for race sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceConfig {
    /// Number of concrete maps; a random draw picks from 0..map_options.
    pub map_options: u8,

    /// The map-choice sentinel that means "draw one at random".
    pub random_map: u8,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            map_options: MAP_OPTIONS,
            random_map: RANDOM_MAP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_race_config_default_matches_protocol_constants() {
        let config = RaceConfig::default();
        assert_eq!(config.map_options, 3);
        assert_eq!(config.random_map, 3);
    }
}
