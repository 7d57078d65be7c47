//! The lobby state machine.

use std::collections::{BTreeMap, BTreeSet};

use slipstream_protocol::PlayerNumber;

use crate::{LobbyConfig, LobbyError};

/// What a successful join hands back, for the `RESPOND_PL_LOBBY_DATA`
/// reply to the joiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Joined {
    /// The allocated slot (smallest free number).
    pub number: PlayerNumber,
    /// The assigned default kart choice.
    pub kart: u8,
    /// The current shared map choice.
    pub map: u8,
}

/// Everything a race needs, frozen at the instant the ready-check passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbySnapshot {
    /// Participants in join order.
    pub roster: Vec<PlayerNumber>,
    /// Kart choices at snapshot time.
    pub kart_choices: BTreeMap<PlayerNumber, u8>,
    /// The requested map (may still be the random sentinel).
    pub map_choice: u8,
}

/// Outcome of a ready toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyCheck {
    /// The start condition is not met yet.
    Pending,
    /// The start condition passed: the lobby has been reset and this
    /// snapshot must be promoted into a race session.
    Start(LobbySnapshot),
}

/// The pre-game lobby: number pool, kart choices, ready flags, map choice.
///
/// Invariants, upheld by every operation:
/// - the free pool plus the assigned numbers always partitions
///   {1..max_players};
/// - no two present members hold the same kart choice;
/// - every member has a ready entry (false until toggled).
pub struct Lobby {
    config: LobbyConfig,
    free_numbers: BTreeSet<u8>,
    /// Members in join order — this order becomes the race roster.
    members: Vec<PlayerNumber>,
    kart_choices: BTreeMap<PlayerNumber, u8>,
    ready: BTreeMap<PlayerNumber, bool>,
    map_choice: u8,
}

impl Lobby {
    /// Creates an empty lobby with the given configuration.
    pub fn new(config: LobbyConfig) -> Self {
        let free_numbers = (1..=config.max_players as u8).collect();
        let map_choice = config.default_map;
        Self {
            config,
            free_numbers,
            members: Vec::new(),
            kart_choices: BTreeMap::new(),
            ready: BTreeMap::new(),
            map_choice,
        }
    }

    /// Allocates the smallest free number and a default kart choice.
    ///
    /// The default kart is `(number - 1) mod kart_options`, advanced
    /// forward past any value another member already holds.
    ///
    /// # Errors
    /// Returns [`LobbyError::Full`] when every slot is taken; nothing is
    /// mutated in that case.
    pub fn join(&mut self) -> Result<Joined, LobbyError> {
        let number = self
            .free_numbers
            .pop_first()
            .map(PlayerNumber)
            .ok_or(LobbyError::Full)?;

        let kart =
            self.resolve_kart(number, (number.0 - 1) % self.config.kart_options);
        self.members.push(number);
        self.kart_choices.insert(number, kart);
        self.ready.insert(number, false);

        tracing::info!(
            player = %number,
            kart,
            members = self.members.len(),
            "player joined lobby"
        );

        Ok(Joined {
            number,
            kart,
            map: self.map_choice,
        })
    }

    /// Removes a member and returns their number to the free pool.
    ///
    /// Idempotent: leaving twice (or releasing a number already in the
    /// pool) changes nothing the second time.
    pub fn leave(&mut self, number: PlayerNumber) {
        let was_member = self.members.iter().any(|m| *m == number);
        self.members.retain(|m| *m != number);
        self.kart_choices.remove(&number);
        self.ready.remove(&number);
        // BTreeSet::insert is a no-op on a double-release.
        self.free_numbers.insert(number.0);

        if was_member {
            tracing::info!(
                player = %number,
                members = self.members.len(),
                "player left lobby"
            );
        }
    }

    /// Reassigns a member's kart choice.
    ///
    /// A collision with another present member is never an error: the
    /// requested value is advanced forward (wrapping) to the next unused
    /// option, and the resolved value is returned for broadcast.
    pub fn choose_kart(
        &mut self,
        number: PlayerNumber,
        requested: u8,
    ) -> Result<u8, LobbyError> {
        if !self.contains(number) {
            return Err(LobbyError::NotJoined(number));
        }
        let kart =
            self.resolve_kart(number, requested % self.config.kart_options);
        self.kart_choices.insert(number, kart);
        tracing::debug!(player = %number, requested, kart, "kart choice updated");
        Ok(kart)
    }

    /// Advances `want` forward (wrapping) until no OTHER member holds it.
    ///
    /// Terminates because the pool holds at most `max_players` members
    /// and there are `kart_options` values to try.
    fn resolve_kart(&self, player: PlayerNumber, want: u8) -> u8 {
        let options = self.config.kart_options;
        let mut kart = want;
        for _ in 0..options {
            let taken = self
                .kart_choices
                .iter()
                .any(|(n, k)| *n != player && *k == kart);
            if !taken {
                return kart;
            }
            kart = (kart + 1) % options;
        }
        // More members than kart options; only reachable with a
        // misconfigured lobby.
        want
    }

    /// Returns a member's current kart choice, or 0 if unknown.
    pub fn kart_choice(&self, number: PlayerNumber) -> u8 {
        self.kart_choices.get(&number).copied().unwrap_or(0)
    }

    /// Returns a member's ready flag; non-members read as not ready.
    pub fn ready_state(&self, number: PlayerNumber) -> bool {
        self.ready.get(&number).copied().unwrap_or(false)
    }

    /// Overwrites the shared map choice (last writer wins).
    pub fn choose_map(&mut self, map: u8) {
        self.map_choice = map;
        tracing::debug!(map, "map choice updated");
    }

    /// Returns the current shared map choice.
    pub fn map_choice(&self) -> u8 {
        self.map_choice
    }

    /// Sets a member's ready flag, then evaluates the start condition:
    /// at least two ready entries and none of them false.
    ///
    /// On success the current roster, kart choices, and map choice are
    /// snapshotted and the lobby resets to empty — the returned
    /// [`LobbySnapshot`] is the only copy of that state.
    pub fn set_ready(
        &mut self,
        number: PlayerNumber,
        ready: bool,
    ) -> Result<ReadyCheck, LobbyError> {
        if !self.contains(number) {
            return Err(LobbyError::NotJoined(number));
        }
        self.ready.insert(number, ready);
        tracing::debug!(player = %number, ready, "ready state updated");

        let all_ready = self.ready.len() >= 2
            && self.ready.values().all(|r| *r);
        if !all_ready {
            return Ok(ReadyCheck::Pending);
        }

        let snapshot = LobbySnapshot {
            roster: self.members.clone(),
            kart_choices: self.kart_choices.clone(),
            map_choice: self.map_choice,
        };
        self.reset();
        tracing::info!(
            players = snapshot.roster.len(),
            map = snapshot.map_choice,
            "ready check passed, lobby closed"
        );
        Ok(ReadyCheck::Start(snapshot))
    }

    /// Clears the lobby back to its freshly-constructed state.
    fn reset(&mut self) {
        self.free_numbers = (1..=self.config.max_players as u8).collect();
        self.members.clear();
        self.kart_choices.clear();
        self.ready.clear();
        self.map_choice = self.config.default_map;
    }

    /// Members in join order.
    pub fn members(&self) -> &[PlayerNumber] {
        &self.members
    }

    /// Current lobby occupancy.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if the lobby has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns `true` if the number belongs to a current member.
    pub fn contains(&self, number: PlayerNumber) -> bool {
        self.members.iter().any(|m| *m == number)
    }
}

impl Default for Lobby {
    fn default() -> Self {
        Self::new(LobbyConfig::default())
    }
}

// =========================================================================
// Tests
// =========================================================================
