//! Per-connection handler: registration, command dispatch, teardown.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register an outbound queue and spawn a writer task to drain it
//!   2. Loop: read lines → parse [`ClientCommand`] → dispatch
//!   3. On exit (clean close, error, or explicit END_CONNECTION), run the
//!      disconnect cascade exactly once

use std::sync::Arc;

use slipstream_lobby::{LobbyError, ReadyCheck};
use slipstream_protocol::{ClientCommand, PlayerNumber, ServerCommand};
use slipstream_race::Removal;
use slipstream_transport::{Connection, ConnectionId, TcpConnection};
use tokio::sync::mpsc;

use crate::registry::{PeerSender, PlayerSlot};
use crate::server::ServerState;
use crate::ServerError;

/// Drop guard that runs the disconnect cascade when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async locks.
struct DisconnectGuard {
    conn_id: ConnectionId,
    player: PlayerSlot,
    state: Arc<ServerState>,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let player = Arc::clone(&self.player);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            disconnect(&state, conn_id, &player).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: TcpConnection,
    state: Arc<ServerState>,
) -> Result<(), ServerError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    // The outbound queue. The registry holds one sender for broadcasts;
    // the handler keeps another for direct replies. The writer task owns
    // the receiver and the connection, flushes the queue in order, and
    // closes the socket once every sender is gone.
    let (outbound, mut rx) = mpsc::unbounded_channel::<ServerCommand>();
    let player = PlayerSlot::default();
    {
        let mut registry = state.registry.lock().await;
        registry.insert(conn_id, Arc::clone(&player), outbound.clone());
    }

    let conn = Arc::new(conn);
    let writer_conn = Arc::clone(&conn);
    let writer_state = Arc::clone(&state);
    let writer_player = Arc::clone(&player);
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            if let Err(e) = writer_conn.send_line(&command.to_string()).await
            {
                tracing::debug!(%conn_id, error = %e, "write failed");
                disconnect(&writer_state, conn_id, &writer_player).await;
                break;
            }
        }
        // All senders dropped (or the write failed): flush is done.
        let _ = writer_conn.close().await;
    });

    let _guard = DisconnectGuard {
        conn_id,
        player: Arc::clone(&player),
        state: Arc::clone(&state),
    };

    loop {
        let line = match conn.recv_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!(%conn_id, "connection closed by peer");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        };
        if line.is_empty() {
            continue;
        }

        let command: ClientCommand = match line.parse() {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(
                    %conn_id, line = %line, error = %e,
                    "dropping malformed command"
                );
                continue;
            }
        };

        let number = player.lock().map(|n| *n).unwrap_or(None);
        match command {
            ClientCommand::ConnCheck => {
                let _ = outbound.send(ServerCommand::ConnCheckAck);
            }

            ClientCommand::PlayerCount => {
                let count = state.lobby.lock().await.len();
                let _ = outbound.send(ServerCommand::PlayerCount(count));
            }

            ClientCommand::ServerStage => {
                let active = state.race.lock().await.is_active();
                let _ = outbound.send(ServerCommand::ServerStage(active));
            }

            ClientCommand::JoinLobby => {
                handle_join(&state, conn_id, &player, &outbound).await;
            }

            ClientCommand::Ready => {
                handle_ready(&state, conn_id, number, true).await;
            }
            ClientCommand::Unready => {
                handle_ready(&state, conn_id, number, false).await;
            }

            ClientCommand::ChooseKart(requested) => {
                let Some(number) = number else {
                    tracing::warn!(%conn_id, "kart choice before join");
                    continue;
                };
                let resolved = {
                    let mut lobby = state.lobby.lock().await;
                    lobby.choose_kart(number, requested)
                };
                match resolved {
                    Ok(kart) => {
                        // Everyone hears the resolved value, the chooser
                        // included — a collision may have moved it off
                        // what they asked for.
                        let registry = state.registry.lock().await;
                        registry.send_to_all(
                            &ServerCommand::OpponentKartChoice {
                                player: number,
                                kart,
                            },
                        );
                    }
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "kart choice dropped");
                    }
                }
            }

            ClientCommand::RequestKartChoice(target) => {
                let kart = state.lobby.lock().await.kart_choice(target);
                let _ = outbound.send(ServerCommand::OpponentKartChoice {
                    player: target,
                    kart,
                });
            }

            ClientCommand::ChooseMap(map) => {
                state.lobby.lock().await.choose_map(map);
                let registry = state.registry.lock().await;
                registry.broadcast_except(
                    conn_id,
                    &ServerCommand::MapChoice(map),
                );
            }

            ClientCommand::KartData(telemetry) => {
                let Some(number) = number else {
                    tracing::debug!(%conn_id, "telemetry before join, dropped");
                    continue;
                };
                let targets = {
                    let race = state.race.lock().await;
                    race.roster_except(number)
                };
                let registry = state.registry.lock().await;
                registry.send_to_numbers(
                    &targets,
                    &ServerCommand::OpponentKartData(telemetry),
                );
            }

            ClientCommand::RaceWon => {
                let Some(number) = number else {
                    continue;
                };
                tracing::info!(player = %number, "race won");
                let targets = {
                    let race = state.race.lock().await;
                    race.roster_except(number)
                };
                let registry = state.registry.lock().await;
                registry.send_to_numbers(
                    &targets,
                    &ServerCommand::RaceLost(number),
                );
            }

            ClientCommand::EndGame => {
                handle_end_game(&state, number).await;
            }

            ClientCommand::EndConnection => {
                tracing::info!(%conn_id, "client requested disconnect");
                let _ = outbound.send(ServerCommand::EndConnection);
                break;
            }

            ClientCommand::EndConnectionInvalid => {
                // The client rejected the connection before joining
                // anything; only the registry entry needs to go.
                tracing::info!(%conn_id, "client rejected connection");
                break;
            }
        }
    }

    // _guard drops here → disconnect cascade fires.
    Ok(())
}

/// Handles `REQUEST_PL_LOBBY_DATA`: allocate a slot, announce the joiner
/// to the room, replay the room to the joiner, then confirm.
async fn handle_join(
    state: &Arc<ServerState>,
    conn_id: ConnectionId,
    player: &PlayerSlot,
    outbound: &PeerSender,
) {
    if player.lock().map(|n| n.is_some()).unwrap_or(false) {
        tracing::warn!(%conn_id, "duplicate join request, dropped");
        return;
    }

    // Joins are refused while a race runs; the lobby reopens on END_GAME.
    if state.race.lock().await.is_active() {
        let _ = outbound.send(ServerCommand::JoinRefused(
            "a race is already running".into(),
        ));
        return;
    }

    // Hold the lobby lock across the join and the catch-up snapshot so
    // the joiner's view is consistent; drop it before touching sockets.
    let (joined, others) = {
        let mut lobby = state.lobby.lock().await;
        let joined = match lobby.join() {
            Ok(joined) => joined,
            Err(LobbyError::Full) => {
                drop(lobby);
                let _ = outbound.send(ServerCommand::JoinRefused(
                    "the lobby is full".into(),
                ));
                return;
            }
            Err(e) => {
                tracing::error!(%conn_id, error = %e, "join failed");
                return;
            }
        };
        let others: Vec<(PlayerNumber, u8, bool)> = lobby
            .members()
            .iter()
            .filter(|m| **m != joined.number)
            .map(|m| (*m, lobby.kart_choice(*m), lobby.ready_state(*m)))
            .collect();
        (joined, others)
    };

    // bind_number writes through the shared slot, so the read at the top
    // of the dispatch loop sees the number from the next command on.
    let mut registry = state.registry.lock().await;
    registry.bind_number(conn_id, joined.number);

    // Announce the joiner to everyone else: presence, default kart, the
    // fresh (not-ready) flag, and the shared map choice they now share.
    registry.broadcast_except(
        conn_id,
        &ServerCommand::OpponentAdd(joined.number),
    );
    registry.broadcast_except(
        conn_id,
        &ServerCommand::OpponentKartChoice {
            player: joined.number,
            kart: joined.kart,
        },
    );
    registry.broadcast_except(
        conn_id,
        &ServerCommand::OpponentReadyState {
            player: joined.number,
            ready: false,
        },
    );
    registry.broadcast_except(conn_id, &ServerCommand::MapChoice(joined.map));
    drop(registry);

    // Replay the existing room to the joiner, then confirm their slot.
    for (member, kart, ready) in others {
        let _ = outbound.send(ServerCommand::OpponentAdd(member));
        let _ = outbound.send(ServerCommand::OpponentKartChoice {
            player: member,
            kart,
        });
        let _ = outbound.send(ServerCommand::OpponentReadyState {
            player: member,
            ready,
        });
    }
    let _ = outbound.send(ServerCommand::LobbyData {
        player: joined.number,
        kart: joined.kart,
        map: joined.map,
    });

    tracing::info!(%conn_id, player = %joined.number, "joined lobby");
}

/// Handles `PLAYER_READY` / `PLAYER_UNREADY`, including the start check.
async fn handle_ready(
    state: &Arc<ServerState>,
    conn_id: ConnectionId,
    number: Option<PlayerNumber>,
    ready: bool,
) {
    let Some(number) = number else {
        tracing::warn!(%conn_id, "ready toggle before join, dropped");
        return;
    };

    let check = {
        let mut lobby = state.lobby.lock().await;
        lobby.set_ready(number, ready)
    };

    match check {
        Ok(ReadyCheck::Pending) => {
            // The toggle that closes the lobby skips this broadcast: the
            // roster learns about the start instead.
            let registry = state.registry.lock().await;
            registry.broadcast_except(
                conn_id,
                &ServerCommand::OpponentReadyState {
                    player: number,
                    ready,
                },
            );
        }
        Ok(ReadyCheck::Start(snapshot)) => {
            let started = {
                let mut race = state.race.lock().await;
                race.start(snapshot)
                    .map(|start| (start, race.roster().to_vec()))
            };
            match started {
                Ok((start, roster)) => {
                    let registry = state.registry.lock().await;
                    // The resolved map overrides whatever each client
                    // guessed locally, then weather, then the green light.
                    registry.send_to_numbers(
                        &roster,
                        &ServerCommand::MapChoice(start.map),
                    );
                    registry.send_to_numbers(
                        &roster,
                        &ServerCommand::Weather(start.bad_weather),
                    );
                    registry
                        .send_to_numbers(&roster, &ServerCommand::StartGame);
                }
                Err(e) => {
                    tracing::error!(error = %e, "race start failed");
                }
            }
        }
        Err(e) => {
            tracing::debug!(%conn_id, error = %e, "ready toggle dropped");
        }
    }
}

/// Handles `END_GAME`: relay the teardown to the rest of the roster,
/// then deactivate the session. Idempotent — a second END_GAME finds an
/// inactive session and does nothing.
///
/// The ended roster's number bindings are cleared in the same registry
/// critical section: the lobby pool has been reset since the race
/// started, so a number kept by an ex-racer could otherwise collide with
/// the same number freshly issued to the next lobby's member.
async fn handle_end_game(
    state: &Arc<ServerState>,
    number: Option<PlayerNumber>,
) {
    let (roster, targets) = {
        let mut race = state.race.lock().await;
        if !race.is_active() {
            return;
        }
        let roster = race.roster().to_vec();
        let targets: Vec<PlayerNumber> = roster
            .iter()
            .copied()
            .filter(|n| Some(*n) != number)
            .collect();
        race.end();
        (roster, targets)
    };

    // Deliver the teardown first — it routes by number, and the
    // bindings are gone right after.
    let mut registry = state.registry.lock().await;
    registry.send_to_numbers(&targets, &ServerCommand::EndGame);
    registry.clear_numbers(&roster);
}

/// The disconnect cascade. Runs at most once per connection — the
/// registry removal is the gate.
///
/// A player racing when they drop is removed from the roster (force-ending
/// the race if they were the last); otherwise their lobby slot is
/// released. Either way the survivors hear `OP_REMOVE`.
///
/// The slot is re-read after the registry gate, not captured at spawn
/// time: a race teardown racing with this cascade may have just cleared
/// it, and a cleared slot must not release a number the next lobby has
/// already reissued. For the same reason the lobby branch only acts when
/// the number still names a current member.
async fn disconnect(
    state: &ServerState,
    conn_id: ConnectionId,
    player: &PlayerSlot,
) {
    {
        let mut registry = state.registry.lock().await;
        if !registry.remove(conn_id) {
            return;
        }
    }
    tracing::info!(%conn_id, "connection unregistered");

    let number = player.lock().map(|n| *n).unwrap_or(None);
    let Some(number) = number else {
        return;
    };

    let (removal, remaining) = {
        let mut race = state.race.lock().await;
        let removal = race.remove_player(number);
        if removal == Removal::RosterEmpty {
            race.end();
        }
        (removal, race.roster().to_vec())
    };

    match removal {
        Removal::NotParticipant => {
            // Lobby phase: free the number and tell the room.
            let was_member = {
                let mut lobby = state.lobby.lock().await;
                if lobby.contains(number) {
                    lobby.leave(number);
                    true
                } else {
                    false
                }
            };
            if was_member {
                let registry = state.registry.lock().await;
                registry.send_to_all(&ServerCommand::OpponentRemove(number));
            }
        }
        Removal::Continues => {
            let registry = state.registry.lock().await;
            registry.send_to_numbers(
                &remaining,
                &ServerCommand::OpponentRemove(number),
            );
        }
        Removal::RosterEmpty => {
            tracing::info!(player = %number, "last racer left, race ended");
        }
    }
}
