//! The protocol's command set, both directions.
//!
//! Every message is one ASCII line: the command verb, then space-separated
//! arguments. [`ClientCommand`] covers client→server verbs (the server
//! parses these and renders them only in test clients); [`ServerCommand`]
//! covers server→client verbs. Both implement `FromStr` and `Display` so
//! either end of the wire can be driven from this crate.

use std::fmt;
use std::str::FromStr;

use crate::types::parse_token;
use crate::{KartTelemetry, PlayerNumber, ProtocolError};

/// Checks an exact argument count for a fixed-arity verb.
fn expect_arity(
    command: &str,
    args: &[&str],
    expected: usize,
) -> Result<(), ProtocolError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ProtocolError::WrongArity {
            command: command.to_string(),
            expected,
            got: args.len(),
        })
    }
}

/// Splits a line into its verb and argument tokens.
fn split_line(line: &str) -> Result<(&str, Vec<&str>), ProtocolError> {
    let mut tokens = line.split_whitespace();
    let verb = tokens.next().ok_or(ProtocolError::EmptyLine)?;
    Ok((verb, tokens.collect()))
}

// ---------------------------------------------------------------------------
// ClientCommand
// ---------------------------------------------------------------------------

/// A command sent by a client to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    /// `REQUEST_CONN_CHECK` — liveness handshake, performed once at join.
    ConnCheck,
    /// `REQUEST_PLAYER_COUNT` — how many players are in the lobby?
    PlayerCount,
    /// `REQUEST_SERVER_STAGE` — is a race currently active?
    ServerStage,
    /// `REQUEST_PL_LOBBY_DATA` — join the lobby and request a slot.
    JoinLobby,
    /// `PLAYER_READY` — set the caller's ready flag.
    Ready,
    /// `PLAYER_UNREADY` — clear the caller's ready flag.
    Unready,
    /// `UPDATE_OWN_KART_OPTION <kart>` — request a kart livery.
    ChooseKart(u8),
    /// `REQUEST_KART_CHOICE <player>` — pull one peer's current kart choice.
    RequestKartChoice(PlayerNumber),
    /// `UPDATE_MAP_CHOICE <map>` — overwrite the shared map choice.
    ChooseMap(u8),
    /// `SEND_KART_DATA <player> <heading> <speed> <x> <y>` — telemetry.
    KartData(KartTelemetry),
    /// `RACE_WON` — the caller crossed the finish line first.
    RaceWon,
    /// `END_GAME` — tear the active race session down.
    EndGame,
    /// `END_CONNECTION` — graceful close.
    EndConnection,
    /// `END_CONN_INVALID` — the client rejected the connection; close
    /// without touching lobby or race state.
    EndConnectionInvalid,
}

impl FromStr for ClientCommand {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (verb, args) = split_line(line)?;
        let cmd = match verb {
            "REQUEST_CONN_CHECK" => {
                expect_arity(verb, &args, 0)?;
                Self::ConnCheck
            }
            "REQUEST_PLAYER_COUNT" => {
                expect_arity(verb, &args, 0)?;
                Self::PlayerCount
            }
            "REQUEST_SERVER_STAGE" => {
                expect_arity(verb, &args, 0)?;
                Self::ServerStage
            }
            "REQUEST_PL_LOBBY_DATA" => {
                expect_arity(verb, &args, 0)?;
                Self::JoinLobby
            }
            "PLAYER_READY" => {
                expect_arity(verb, &args, 0)?;
                Self::Ready
            }
            "PLAYER_UNREADY" => {
                expect_arity(verb, &args, 0)?;
                Self::Unready
            }
            "UPDATE_OWN_KART_OPTION" => {
                expect_arity(verb, &args, 1)?;
                Self::ChooseKart(parse_token(verb, args[0])?)
            }
            "REQUEST_KART_CHOICE" => {
                expect_arity(verb, &args, 1)?;
                Self::RequestKartChoice(parse_token(verb, args[0])?)
            }
            "UPDATE_MAP_CHOICE" => {
                expect_arity(verb, &args, 1)?;
                Self::ChooseMap(parse_token(verb, args[0])?)
            }
            "SEND_KART_DATA" => {
                Self::KartData(KartTelemetry::parse_args(verb, &args)?)
            }
            "RACE_WON" => {
                expect_arity(verb, &args, 0)?;
                Self::RaceWon
            }
            "END_GAME" => {
                expect_arity(verb, &args, 0)?;
                Self::EndGame
            }
            "END_CONNECTION" => {
                expect_arity(verb, &args, 0)?;
                Self::EndConnection
            }
            "END_CONN_INVALID" => {
                expect_arity(verb, &args, 0)?;
                Self::EndConnectionInvalid
            }
            other => {
                return Err(ProtocolError::UnknownCommand(other.to_string()))
            }
        };
        Ok(cmd)
    }
}

impl fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnCheck => write!(f, "REQUEST_CONN_CHECK"),
            Self::PlayerCount => write!(f, "REQUEST_PLAYER_COUNT"),
            Self::ServerStage => write!(f, "REQUEST_SERVER_STAGE"),
            Self::JoinLobby => write!(f, "REQUEST_PL_LOBBY_DATA"),
            Self::Ready => write!(f, "PLAYER_READY"),
            Self::Unready => write!(f, "PLAYER_UNREADY"),
            Self::ChooseKart(kart) => {
                write!(f, "UPDATE_OWN_KART_OPTION {kart}")
            }
            Self::RequestKartChoice(player) => {
                write!(f, "REQUEST_KART_CHOICE {player}")
            }
            Self::ChooseMap(map) => write!(f, "UPDATE_MAP_CHOICE {map}"),
            Self::KartData(t) => {
                write!(f, "SEND_KART_DATA {}", t.render_args())
            }
            Self::RaceWon => write!(f, "RACE_WON"),
            Self::EndGame => write!(f, "END_GAME"),
            Self::EndConnection => write!(f, "END_CONNECTION"),
            Self::EndConnectionInvalid => write!(f, "END_CONN_INVALID"),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerCommand
// ---------------------------------------------------------------------------

/// A command sent by the server to a client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerCommand {
    /// `RESPOND_CONN_CHECK` — liveness handshake reply.
    ConnCheckAck,
    /// `RESPOND_PLAYER_COUNT <count>` — current lobby occupancy.
    PlayerCount(usize),
    /// `RESPOND_SERVER_STAGE <active>` — whether a race is active.
    ServerStage(bool),
    /// `RESPOND_PL_LOBBY_DATA <player> <kart> <map>` — the joiner's own
    /// assigned slot, kart, and the shared map choice.
    LobbyData {
        player: PlayerNumber,
        kart: u8,
        map: u8,
    },
    /// `OP_ADD <player>` — a peer joined.
    OpponentAdd(PlayerNumber),
    /// `OP_REMOVE <player>` — a peer left or disconnected.
    OpponentRemove(PlayerNumber),
    /// `UPDATE_OP_KART_CHOICE <player> <kart>` — a peer's kart choice.
    OpponentKartChoice { player: PlayerNumber, kart: u8 },
    /// `UPDATE_OP_READY_STATE <player> <ready>` — a peer's ready flag.
    OpponentReadyState { player: PlayerNumber, ready: bool },
    /// `UPDATE_MAP_CHOICE <map>` — the shared (or resolved) map choice.
    MapChoice(u8),
    /// `UPDATE_WEATHER <bad>` — the race's weather draw.
    Weather(bool),
    /// `REQUEST_START_GAME` — the ready-check passed; enter the race.
    StartGame,
    /// `SEND_OP_KART_DATA <player> <heading> <speed> <x> <y>` — relayed
    /// telemetry from a peer.
    OpponentKartData(KartTelemetry),
    /// `RACE_LOST <winner>` — another player won the race.
    RaceLost(PlayerNumber),
    /// `END_GAME` — the race session was torn down.
    EndGame,
    /// `END_CONNECTION` — graceful close acknowledgement.
    EndConnection,
    /// `JOIN_REFUSED <reason>` — the join was rejected (lobby full or a
    /// race is already running); no state was mutated.
    JoinRefused(String),
}

impl FromStr for ServerCommand {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (verb, args) = split_line(line)?;
        let cmd = match verb {
            "RESPOND_CONN_CHECK" => {
                expect_arity(verb, &args, 0)?;
                Self::ConnCheckAck
            }
            "RESPOND_PLAYER_COUNT" => {
                expect_arity(verb, &args, 1)?;
                Self::PlayerCount(parse_token(verb, args[0])?)
            }
            "RESPOND_SERVER_STAGE" => {
                expect_arity(verb, &args, 1)?;
                Self::ServerStage(parse_token(verb, args[0])?)
            }
            "RESPOND_PL_LOBBY_DATA" => {
                expect_arity(verb, &args, 3)?;
                Self::LobbyData {
                    player: parse_token(verb, args[0])?,
                    kart: parse_token(verb, args[1])?,
                    map: parse_token(verb, args[2])?,
                }
            }
            "OP_ADD" => {
                expect_arity(verb, &args, 1)?;
                Self::OpponentAdd(parse_token(verb, args[0])?)
            }
            "OP_REMOVE" => {
                expect_arity(verb, &args, 1)?;
                Self::OpponentRemove(parse_token(verb, args[0])?)
            }
            "UPDATE_OP_KART_CHOICE" => {
                expect_arity(verb, &args, 2)?;
                Self::OpponentKartChoice {
                    player: parse_token(verb, args[0])?,
                    kart: parse_token(verb, args[1])?,
                }
            }
            "UPDATE_OP_READY_STATE" => {
                expect_arity(verb, &args, 2)?;
                Self::OpponentReadyState {
                    player: parse_token(verb, args[0])?,
                    ready: parse_token(verb, args[1])?,
                }
            }
            "UPDATE_MAP_CHOICE" => {
                expect_arity(verb, &args, 1)?;
                Self::MapChoice(parse_token(verb, args[0])?)
            }
            "UPDATE_WEATHER" => {
                expect_arity(verb, &args, 1)?;
                Self::Weather(parse_token(verb, args[0])?)
            }
            "REQUEST_START_GAME" => {
                expect_arity(verb, &args, 0)?;
                Self::StartGame
            }
            "SEND_OP_KART_DATA" => {
                Self::OpponentKartData(KartTelemetry::parse_args(verb, &args)?)
            }
            "RACE_LOST" => {
                expect_arity(verb, &args, 1)?;
                Self::RaceLost(parse_token(verb, args[0])?)
            }
            "END_GAME" => {
                expect_arity(verb, &args, 0)?;
                Self::EndGame
            }
            "END_CONNECTION" => {
                expect_arity(verb, &args, 0)?;
                Self::EndConnection
            }
            // The refusal reason is free text: everything after the verb.
            "JOIN_REFUSED" => Self::JoinRefused(args.join(" ")),
            other => {
                return Err(ProtocolError::UnknownCommand(other.to_string()))
            }
        };
        Ok(cmd)
    }
}

impl fmt::Display for ServerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnCheckAck => write!(f, "RESPOND_CONN_CHECK"),
            Self::PlayerCount(count) => {
                write!(f, "RESPOND_PLAYER_COUNT {count}")
            }
            Self::ServerStage(active) => {
                write!(f, "RESPOND_SERVER_STAGE {active}")
            }
            Self::LobbyData { player, kart, map } => {
                write!(f, "RESPOND_PL_LOBBY_DATA {player} {kart} {map}")
            }
            Self::OpponentAdd(player) => write!(f, "OP_ADD {player}"),
            Self::OpponentRemove(player) => write!(f, "OP_REMOVE {player}"),
            Self::OpponentKartChoice { player, kart } => {
                write!(f, "UPDATE_OP_KART_CHOICE {player} {kart}")
            }
            Self::OpponentReadyState { player, ready } => {
                write!(f, "UPDATE_OP_READY_STATE {player} {ready}")
            }
            Self::MapChoice(map) => write!(f, "UPDATE_MAP_CHOICE {map}"),
            Self::Weather(bad) => write!(f, "UPDATE_WEATHER {bad}"),
            Self::StartGame => write!(f, "REQUEST_START_GAME"),
            Self::OpponentKartData(t) => {
                write!(f, "SEND_OP_KART_DATA {}", t.render_args())
            }
            Self::RaceLost(winner) => write!(f, "RACE_LOST {winner}"),
            Self::EndGame => write!(f, "END_GAME"),
            Self::EndConnection => write!(f, "END_CONNECTION"),
            Self::JoinRefused(reason) => {
                write!(f, "JOIN_REFUSED {reason}")
            }
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
