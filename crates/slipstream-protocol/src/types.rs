//! Core protocol values shared by every layer.

use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Protocol constants
// ---------------------------------------------------------------------------

/// Hard cap on simultaneously joined players: numbers are drawn from {1..6}.
pub const MAX_PLAYERS: usize = 6;

/// Number of selectable kart liveries. Choices are 0..=6.
pub const KART_OPTIONS: u8 = 7;

/// Number of concrete maps. Choices are 0..=2.
pub const MAP_OPTIONS: u8 = 3;

/// Map choice sentinel meaning "pick one at random at race start".
pub const RANDOM_MAP: u8 = 3;

/// Well-known listen port for the server binary.
pub const DEFAULT_PORT: u16 = 5000;

// ---------------------------------------------------------------------------
// PlayerNumber
// ---------------------------------------------------------------------------

/// A player's slot number, unique among currently joined players.
///
/// A newtype over `u8` so a player number can't be confused with a kart
/// or map choice in a function signature. On the wire it is rendered as
/// the bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerNumber(pub u8);

impl fmt::Display for PlayerNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PlayerNumber {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u8>().map(PlayerNumber)
    }
}

// ---------------------------------------------------------------------------
// KartTelemetry
// ---------------------------------------------------------------------------

/// One per-tick kart state report, relayed verbatim between racers.
///
/// The server performs no validation or smoothing on these values — each
/// client is the authority over its own kart (trust-the-client model).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KartTelemetry {
    /// The reporting player's number.
    pub player: PlayerNumber,
    /// Heading in degrees.
    pub heading: f32,
    /// Current speed.
    pub speed: f32,
    /// World-space X position.
    pub x: f32,
    /// World-space Y position.
    pub y: f32,
}

impl KartTelemetry {
    /// Renders the space-separated argument tail shared by
    /// `SEND_KART_DATA` and `SEND_OP_KART_DATA`.
    pub(crate) fn render_args(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.player, self.heading, self.speed, self.x, self.y
        )
    }

    /// Parses the five-token argument tail of a kart-data command.
    pub(crate) fn parse_args(
        command: &str,
        args: &[&str],
    ) -> Result<Self, ProtocolError> {
        if args.len() != 5 {
            return Err(ProtocolError::WrongArity {
                command: command.to_string(),
                expected: 5,
                got: args.len(),
            });
        }
        Ok(Self {
            player: parse_token(command, args[0])?,
            heading: parse_token(command, args[1])?,
            speed: parse_token(command, args[2])?,
            x: parse_token(command, args[3])?,
            y: parse_token(command, args[4])?,
        })
    }
}

/// Parses one token, mapping the failure into [`ProtocolError::InvalidArgument`].
pub(crate) fn parse_token<T>(
    command: &str,
    token: &str,
) -> Result<T, ProtocolError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    token
        .parse()
        .map_err(|e: T::Err| ProtocolError::InvalidArgument {
            command: command.to_string(),
            value: token.to_string(),
            reason: e.to_string(),
        })
}
