//! The race-session state machine.

use std::collections::BTreeMap;

use rand::Rng;
use slipstream_lobby::LobbySnapshot;
use slipstream_protocol::PlayerNumber;

use crate::{RaceConfig, RaceError};

/// The authoritative values drawn at race start, for broadcast to the
/// roster. Clients may have guessed differently (a locally-rolled random
/// map), so this broadcast overrides whatever they hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceStart {
    /// The resolved, concrete map.
    pub map: u8,
    /// Whether the bad-weather coin flip came up.
    pub bad_weather: bool,
}

/// Outcome of removing a player from an active race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The player was not part of this race; nothing changed.
    NotParticipant,
    /// The player is out; the race continues for the rest.
    Continues,
    /// The player was the last one — the caller must force an
    /// end-of-game teardown so no orphaned active session lingers.
    RosterEmpty,
}

/// One active race: the frozen roster and the resolved race parameters.
///
/// At most one race exists per process. The session holds no sockets and
/// sends nothing — it only answers "who gets this message".
pub struct RaceSession {
    config: RaceConfig,
    roster: Vec<PlayerNumber>,
    kart_choices: BTreeMap<PlayerNumber, u8>,
    map: u8,
    bad_weather: bool,
    active: bool,
}

impl RaceSession {
    /// Creates an inactive session.
    pub fn new(config: RaceConfig) -> Self {
        Self {
            config,
            roster: Vec::new(),
            kart_choices: BTreeMap::new(),
            map: 0,
            bad_weather: false,
            active: false,
        }
    }

    /// Promotes a lobby snapshot into the active race.
    ///
    /// The random-map sentinel resolves to a uniform draw over the
    /// concrete maps; bad weather is an independent fair coin.
    ///
    /// # Errors
    /// Returns [`RaceError::AlreadyActive`] if a race is running — the
    /// design supports exactly one active session.
    pub fn start(
        &mut self,
        snapshot: LobbySnapshot,
    ) -> Result<RaceStart, RaceError> {
        if self.active {
            return Err(RaceError::AlreadyActive);
        }

        let mut rng = rand::rng();
        self.map = if snapshot.map_choice == self.config.random_map {
            rng.random_range(0..self.config.map_options)
        } else {
            snapshot.map_choice
        };
        self.bad_weather = rng.random_bool(0.5);
        self.roster = snapshot.roster;
        self.kart_choices = snapshot.kart_choices;
        self.active = true;

        tracing::info!(
            players = self.roster.len(),
            map = self.map,
            bad_weather = self.bad_weather,
            "race started"
        );

        Ok(RaceStart {
            map: self.map,
            bad_weather: self.bad_weather,
        })
    }

    /// Returns the fan-out targets for a message from `origin`: every
    /// roster member except the originator.
    ///
    /// Empty when no race is active or the originator is not in the
    /// roster (late joiners are never admitted).
    pub fn roster_except(&self, origin: PlayerNumber) -> Vec<PlayerNumber> {
        if !self.active || !self.contains(origin) {
            return Vec::new();
        }
        self.roster
            .iter()
            .copied()
            .filter(|n| *n != origin)
            .collect()
    }

    /// Removes a player from the roster (disconnect mid-race).
    pub fn remove_player(&mut self, number: PlayerNumber) -> Removal {
        if !self.active || !self.contains(number) {
            return Removal::NotParticipant;
        }
        self.roster.retain(|n| *n != number);
        self.kart_choices.remove(&number);
        tracing::info!(
            player = %number,
            remaining = self.roster.len(),
            "player removed from race"
        );
        if self.roster.is_empty() {
            Removal::RosterEmpty
        } else {
            Removal::Continues
        }
    }

    /// Tears the session down: clears roster, karts, map, weather, and
    /// drops the active flag. Idempotent — ending an inactive session is
    /// a no-op. Returns whether anything changed.
    pub fn end(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.roster.clear();
        self.kart_choices.clear();
        self.map = 0;
        self.bad_weather = false;
        self.active = false;
        tracing::info!("race ended");
        true
    }

    /// Returns `true` while a race is running.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The frozen participant list, in lobby join order.
    pub fn roster(&self) -> &[PlayerNumber] {
        &self.roster
    }

    /// Returns `true` if the number belongs to a race participant.
    pub fn contains(&self, number: PlayerNumber) -> bool {
        self.roster.iter().any(|n| *n == number)
    }

    /// The resolved map (0 when inactive).
    pub fn map(&self) -> u8 {
        self.map
    }

    /// The weather draw (false when inactive).
    pub fn bad_weather(&self) -> bool {
        self.bad_weather
    }
}

impl Default for RaceSession {
    fn default() -> Self {
        Self::new(RaceConfig::default())
    }
}

// =========================================================================
// Tests
// =========================================================================
