//! End-to-end tests: a running server, real TCP clients, wire commands.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use slipstream::SlipstreamServer;
use slipstream_protocol::{KartTelemetry, PlayerNumber, ServerCommand};

/// Starts a server on a random port and returns its address.
async fn start_server() -> String {
    let server = SlipstreamServer::builder()
        .bind("127.0.0.1:0")
        .build()
        .await
        .expect("should bind");
    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    tokio::spawn(server.run());
    addr
}

/// A scripted racing client speaking the line protocol.
struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).await.expect("should connect");
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("should send");
    }

    async fn recv(&mut self) -> ServerCommand {
        let mut line = String::new();
        let n = timeout(
            Duration::from_secs(5),
            self.reader.read_line(&mut line),
        )
        .await
        .expect("timed out waiting for a server command")
        .expect("read failed");
        assert!(n > 0, "server closed the connection unexpectedly");
        line.trim_end()
            .parse()
            .unwrap_or_else(|e| panic!("bad server line {line:?}: {e}"))
    }

    /// Reads commands until one matches, tolerating unrelated traffic.
    async fn recv_until(
        &mut self,
        pred: impl Fn(&ServerCommand) -> bool,
    ) -> ServerCommand {
        for _ in 0..32 {
            let command = self.recv().await;
            if pred(&command) {
                return command;
            }
        }
        panic!("expected command never arrived");
    }

    /// Joins the lobby and returns the assigned (player, kart, map).
    async fn join(&mut self) -> (PlayerNumber, u8, u8) {
        self.send("REQUEST_PL_LOBBY_DATA").await;
        match self
            .recv_until(|c| matches!(c, ServerCommand::LobbyData { .. }))
            .await
        {
            ServerCommand::LobbyData { player, kart, map } => {
                (player, kart, map)
            }
            _ => unreachable!(),
        }
    }

    /// Asserts the server closed this connection.
    async fn expect_closed(&mut self) {
        let mut line = String::new();
        let n = timeout(
            Duration::from_secs(5),
            self.reader.read_line(&mut line),
        )
        .await
        .expect("timed out waiting for close")
        .expect("read failed");
        assert_eq!(n, 0, "expected EOF, got {line:?}");
    }
}

/// Drives two fresh clients through join and ready-up into a race.
async fn start_two_player_race(
    addr: &str,
) -> (TestClient, TestClient) {
    let mut c1 = TestClient::connect(addr).await;
    let mut c2 = TestClient::connect(addr).await;
    assert_eq!(c1.join().await.0, PlayerNumber(1));
    assert_eq!(c2.join().await.0, PlayerNumber(2));

    c1.send("PLAYER_READY").await;
    c2.recv_until(|c| {
        matches!(
            c,
            ServerCommand::OpponentReadyState {
                player: PlayerNumber(1),
                ready: true
            }
        )
    })
    .await;
    c2.send("PLAYER_READY").await;

    for client in [&mut c1, &mut c2] {
        client
            .recv_until(|c| matches!(c, ServerCommand::StartGame))
            .await;
    }
    (c1, c2)
}

#[tokio::test]
async fn test_conn_check_round_trip() {
    let addr = start_server().await;
    let mut client = TestClient::connect(&addr).await;

    client.send("REQUEST_CONN_CHECK").await;
    assert_eq!(client.recv().await, ServerCommand::ConnCheckAck);
}

#[tokio::test]
async fn test_malformed_line_is_dropped_not_fatal() {
    let addr = start_server().await;
    let mut client = TestClient::connect(&addr).await;

    client.send("BOGUS_VERB 1 2 3").await;
    client.send("PLAYER_READY extra").await;
    client.send("REQUEST_CONN_CHECK").await;
    assert_eq!(client.recv().await, ServerCommand::ConnCheckAck);
}

#[tokio::test]
async fn test_first_join_gets_slot_one_and_default_kart() {
    let addr = start_server().await;
    let mut client = TestClient::connect(&addr).await;

    assert_eq!(client.join().await, (PlayerNumber(1), 0, 0));

    client.send("REQUEST_PLAYER_COUNT").await;
    assert_eq!(client.recv().await, ServerCommand::PlayerCount(1));
    client.send("REQUEST_SERVER_STAGE").await;
    assert_eq!(client.recv().await, ServerCommand::ServerStage(false));
}

#[tokio::test]
async fn test_join_is_announced_to_the_room_and_replayed_to_joiner() {
    let addr = start_server().await;
    let mut c1 = TestClient::connect(&addr).await;
    c1.join().await;

    let mut c2 = TestClient::connect(&addr).await;
    c2.send("REQUEST_PL_LOBBY_DATA").await;

    // The joiner hears the room replay before their own confirmation.
    assert_eq!(
        c2.recv().await,
        ServerCommand::OpponentAdd(PlayerNumber(1))
    );
    assert_eq!(
        c2.recv().await,
        ServerCommand::OpponentKartChoice {
            player: PlayerNumber(1),
            kart: 0
        }
    );
    assert_eq!(
        c2.recv().await,
        ServerCommand::OpponentReadyState {
            player: PlayerNumber(1),
            ready: false
        }
    );
    assert_eq!(
        c2.recv().await,
        ServerCommand::LobbyData {
            player: PlayerNumber(2),
            kart: 1,
            map: 0
        }
    );

    // The room hears the joiner's presence, kart, flag, and map.
    assert_eq!(
        c1.recv().await,
        ServerCommand::OpponentAdd(PlayerNumber(2))
    );
    assert_eq!(
        c1.recv().await,
        ServerCommand::OpponentKartChoice {
            player: PlayerNumber(2),
            kart: 1
        }
    );
    assert_eq!(
        c1.recv().await,
        ServerCommand::OpponentReadyState {
            player: PlayerNumber(2),
            ready: false
        }
    );
    assert_eq!(c1.recv().await, ServerCommand::MapChoice(0));
}

#[tokio::test]
async fn test_kart_collision_resolves_and_reaches_everyone() {
    let addr = start_server().await;
    let mut c1 = TestClient::connect(&addr).await;
    let mut c2 = TestClient::connect(&addr).await;
    c1.join().await; // kart 0
    c2.join().await; // kart 1

    // Player 1 asks for kart 1, already held by player 2 → resolved to 2,
    // and the chooser hears the resolved value too.
    c1.send("UPDATE_OWN_KART_OPTION 1").await;
    let expected = ServerCommand::OpponentKartChoice {
        player: PlayerNumber(1),
        kart: 2,
    };
    assert_eq!(c1.recv_until(|c| *c == expected).await, expected);
    assert_eq!(c2.recv_until(|c| *c == expected).await, expected);
}

#[tokio::test]
async fn test_kart_choice_query_answers_the_requester_only() {
    let addr = start_server().await;
    let mut c1 = TestClient::connect(&addr).await;
    let mut c2 = TestClient::connect(&addr).await;
    c1.join().await;
    c2.join().await;

    c2.send("REQUEST_KART_CHOICE 1").await;
    assert_eq!(
        c2.recv().await,
        ServerCommand::OpponentKartChoice {
            player: PlayerNumber(1),
            kart: 0
        }
    );

    // The subject of the query hears nothing about it.
    c1.send("REQUEST_CONN_CHECK").await;
    assert_eq!(
        c1.recv_until(|c| !matches!(c, ServerCommand::OpponentAdd(_)
            | ServerCommand::OpponentKartChoice { .. }
            | ServerCommand::OpponentReadyState { .. }
            | ServerCommand::MapChoice(_)))
            .await,
        ServerCommand::ConnCheckAck
    );
}

#[tokio::test]
async fn test_map_choice_reaches_other_players() {
    let addr = start_server().await;
    let mut c1 = TestClient::connect(&addr).await;
    let mut c2 = TestClient::connect(&addr).await;
    c1.join().await;
    c2.join().await;

    c1.send("UPDATE_MAP_CHOICE 2").await;
    assert_eq!(
        c2.recv_until(|c| matches!(c, ServerCommand::MapChoice(2))).await,
        ServerCommand::MapChoice(2)
    );
}

#[tokio::test]
async fn test_ready_check_starts_the_race_and_resets_the_lobby() {
    let addr = start_server().await;
    let mut c1 = TestClient::connect(&addr).await;
    let mut c2 = TestClient::connect(&addr).await;
    c1.join().await;
    c2.join().await;
    // Drain player 2's join announcements on player 1's stream.
    c1.recv_until(|c| matches!(c, ServerCommand::MapChoice(_))).await;

    c1.send("PLAYER_READY").await;
    assert_eq!(
        c2.recv().await,
        ServerCommand::OpponentReadyState {
            player: PlayerNumber(1),
            ready: true
        }
    );

    // The second ready closes the lobby: the toggle is not broadcast,
    // both racers get the resolved map, the weather, and the green light.
    c2.send("PLAYER_READY").await;
    for client in [&mut c1, &mut c2] {
        assert!(matches!(
            client.recv().await,
            ServerCommand::MapChoice(0)
        ));
        assert!(matches!(client.recv().await, ServerCommand::Weather(_)));
        assert_eq!(client.recv().await, ServerCommand::StartGame);
    }

    // The lobby is empty again and the race session is live.
    c1.send("REQUEST_PLAYER_COUNT").await;
    assert_eq!(c1.recv().await, ServerCommand::PlayerCount(0));
    c1.send("REQUEST_SERVER_STAGE").await;
    assert_eq!(c1.recv().await, ServerCommand::ServerStage(true));
}

#[tokio::test]
async fn test_random_map_sentinel_resolves_to_a_concrete_map() {
    let addr = start_server().await;
    let mut c1 = TestClient::connect(&addr).await;
    let mut c2 = TestClient::connect(&addr).await;
    c1.join().await;
    c2.join().await;

    // The lobby-phase relay of the raw choice still carries the
    // sentinel; wait for it so the ready-up below races nothing.
    c1.send("UPDATE_MAP_CHOICE 3").await;
    c2.recv_until(|c| matches!(c, ServerCommand::MapChoice(3))).await;

    c1.send("PLAYER_READY").await;
    c2.recv_until(|c| {
        matches!(c, ServerCommand::OpponentReadyState { ready: true, .. })
    })
    .await;
    c2.send("PLAYER_READY").await;

    // The race-start broadcast is the last map choice before the green
    // light, and it must carry a playable map, never the sentinel.
    let mut resolved = None;
    loop {
        match c2.recv().await {
            ServerCommand::MapChoice(map) => resolved = Some(map),
            ServerCommand::StartGame => break,
            _ => {}
        }
    }
    let map = resolved.expect("no map broadcast before the start");
    assert!(map < 3, "sentinel leaked to clients: {map}");
}

#[tokio::test]
async fn test_join_refused_while_race_is_active() {
    let addr = start_server().await;
    let (_c1, _c2) = start_two_player_race(&addr).await;

    let mut late = TestClient::connect(&addr).await;
    late.send("REQUEST_PL_LOBBY_DATA").await;
    assert_eq!(
        late.recv().await,
        ServerCommand::JoinRefused("a race is already running".into())
    );
}

#[tokio::test]
async fn test_seventh_client_is_refused_when_lobby_is_full() {
    let addr = start_server().await;
    let mut seated = Vec::new();
    for n in 1..=6u8 {
        let mut client = TestClient::connect(&addr).await;
        assert_eq!(client.join().await.0, PlayerNumber(n));
        seated.push(client);
    }

    let mut seventh = TestClient::connect(&addr).await;
    seventh.send("REQUEST_PL_LOBBY_DATA").await;
    assert_eq!(
        seventh.recv().await,
        ServerCommand::JoinRefused("the lobby is full".into())
    );
}

#[tokio::test]
async fn test_telemetry_fans_out_to_the_other_racers() {
    let addr = start_server().await;
    let (mut c1, mut c2) = start_two_player_race(&addr).await;

    c1.send("SEND_KART_DATA 1 0.5 12 3.5 4.5").await;
    assert_eq!(
        c2.recv().await,
        ServerCommand::OpponentKartData(KartTelemetry {
            player: PlayerNumber(1),
            heading: 0.5,
            speed: 12.0,
            x: 3.5,
            y: 4.5,
        })
    );

    // The sender never gets their own telemetry back.
    c1.send("REQUEST_CONN_CHECK").await;
    assert_eq!(c1.recv().await, ServerCommand::ConnCheckAck);
}

#[tokio::test]
async fn test_race_won_notifies_the_losers() {
    let addr = start_server().await;
    let (mut c1, mut c2) = start_two_player_race(&addr).await;

    c1.send("RACE_WON").await;
    assert_eq!(
        c2.recv().await,
        ServerCommand::RaceLost(PlayerNumber(1))
    );

    c1.send("REQUEST_CONN_CHECK").await;
    assert_eq!(c1.recv().await, ServerCommand::ConnCheckAck);
}

#[tokio::test]
async fn test_end_game_relays_to_survivors_and_reopens_the_lobby() {
    let addr = start_server().await;
    let (mut c1, mut c2) = start_two_player_race(&addr).await;

    c1.send("END_GAME").await;
    assert_eq!(c2.recv().await, ServerCommand::EndGame);

    // A second END_GAME finds an inactive session and does nothing.
    c2.send("END_GAME").await;

    c1.send("REQUEST_SERVER_STAGE").await;
    assert_eq!(c1.recv().await, ServerCommand::ServerStage(false));

    // The lobby accepts players again.
    let mut next = TestClient::connect(&addr).await;
    assert_eq!(next.join().await.0, PlayerNumber(1));
}

#[tokio::test]
async fn test_graceful_disconnect_is_acknowledged_and_announced() {
    let addr = start_server().await;
    let mut c1 = TestClient::connect(&addr).await;
    let mut c2 = TestClient::connect(&addr).await;
    c1.join().await;
    c2.join().await;

    c1.send("END_CONNECTION").await;
    assert_eq!(
        c1.recv_until(|c| matches!(c, ServerCommand::EndConnection)).await,
        ServerCommand::EndConnection
    );
    c1.expect_closed().await;

    assert_eq!(
        c2.recv_until(|c| matches!(c, ServerCommand::OpponentRemove(_)))
            .await,
        ServerCommand::OpponentRemove(PlayerNumber(1))
    );

    // Number 1 is free again and is the next one issued.
    let mut c3 = TestClient::connect(&addr).await;
    assert_eq!(c3.join().await.0, PlayerNumber(1));
}

#[tokio::test]
async fn test_invalid_connection_close_touches_nothing() {
    let addr = start_server().await;
    let mut c1 = TestClient::connect(&addr).await;
    c1.join().await;

    // A second client rejects the connection before joining; the lobby
    // never hears about it.
    let mut invalid = TestClient::connect(&addr).await;
    invalid.send("END_CONN_INVALID").await;
    invalid.expect_closed().await;

    c1.send("REQUEST_PLAYER_COUNT").await;
    assert_eq!(c1.recv().await, ServerCommand::PlayerCount(1));
}

#[tokio::test]
async fn test_abrupt_disconnect_in_lobby_frees_the_number() {
    let addr = start_server().await;
    let mut c1 = TestClient::connect(&addr).await;
    let mut c2 = TestClient::connect(&addr).await;
    c1.join().await;
    c2.join().await;

    drop(c1);
    assert_eq!(
        c2.recv_until(|c| matches!(c, ServerCommand::OpponentRemove(_)))
            .await,
        ServerCommand::OpponentRemove(PlayerNumber(1))
    );

    let mut c3 = TestClient::connect(&addr).await;
    assert_eq!(c3.join().await.0, PlayerNumber(1));
}

#[tokio::test]
async fn test_disconnect_mid_race_keeps_the_race_running() {
    let addr = start_server().await;
    let mut c1 = TestClient::connect(&addr).await;
    let mut c2 = TestClient::connect(&addr).await;
    let mut c3 = TestClient::connect(&addr).await;
    c1.join().await;
    c2.join().await;
    c3.join().await;

    c1.send("PLAYER_READY").await;
    c2.send("PLAYER_READY").await;
    c3.send("PLAYER_READY").await;
    for client in [&mut c1, &mut c2, &mut c3] {
        client
            .recv_until(|c| matches!(c, ServerCommand::StartGame))
            .await;
    }

    drop(c2);
    for client in [&mut c1, &mut c3] {
        assert_eq!(
            client
                .recv_until(|c| matches!(c, ServerCommand::OpponentRemove(_)))
                .await,
            ServerCommand::OpponentRemove(PlayerNumber(2))
        );
    }

    c1.send("REQUEST_SERVER_STAGE").await;
    assert_eq!(c1.recv().await, ServerCommand::ServerStage(true));

    // Telemetry still flows between the survivors.
    c1.send("SEND_KART_DATA 1 1 5 0 0").await;
    assert!(matches!(
        c3.recv().await,
        ServerCommand::OpponentKartData(_)
    ));
}

#[tokio::test]
async fn test_ex_racer_can_rejoin_the_next_lobby() {
    let addr = start_server().await;
    let (mut c1, mut c2) = start_two_player_race(&addr).await;

    c1.send("END_GAME").await;
    assert_eq!(c2.recv().await, ServerCommand::EndGame);

    // The race consumed both lobby memberships; the ended roster's
    // numbers are released, so both ex-racers join the next lobby fresh.
    assert_eq!(c1.join().await.0, PlayerNumber(1));
    assert_eq!(c2.join().await.0, PlayerNumber(2));
}

#[tokio::test]
async fn test_ex_racer_disconnect_cannot_evict_the_next_number_holder() {
    let addr = start_server().await;
    let (c1, mut c2) = start_two_player_race(&addr).await;

    c2.send("END_GAME").await;
    c2.send("REQUEST_SERVER_STAGE").await;
    assert_eq!(c2.recv().await, ServerCommand::ServerStage(false));

    // c1 held number 1 in the race; after the end, the reset pool
    // reissues 1 to a fresh client.
    let mut c3 = TestClient::connect(&addr).await;
    assert_eq!(c3.join().await.0, PlayerNumber(1));

    // The ex-racer dropping now must not release the recycled number.
    drop(c1);
    tokio::time::sleep(Duration::from_millis(100)).await;

    c3.send("REQUEST_PLAYER_COUNT").await;
    assert_eq!(c3.recv().await, ServerCommand::PlayerCount(1));

    // Number 1 is still taken, so the next join gets 2 — a duplicate
    // issue of 1 would break every broadcast keyed by number.
    let mut c4 = TestClient::connect(&addr).await;
    assert_eq!(c4.join().await.0, PlayerNumber(2));
}

#[tokio::test]
async fn test_all_racers_leaving_force_ends_the_race() {
    let addr = start_server().await;
    let (c1, c2) = start_two_player_race(&addr).await;
    drop(c1);
    drop(c2);

    // The teardown is asynchronous; poll the stage until it settles.
    let mut observer = TestClient::connect(&addr).await;
    for _ in 0..50 {
        observer.send("REQUEST_SERVER_STAGE").await;
        if observer.recv().await == ServerCommand::ServerStage(false) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("race never ended after the last racer left");
}
