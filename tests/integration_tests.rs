//! Integration tests for the race client
//!
//! A scripted server on a real TCP socket plays the coordinator's side while
//! the test ticks the client game with a simulated clock.

use assert_approx_eq::assert_approx_eq;
use client::config::{ClientConfig, TrackConfig};
use client::error::ConnectionError;
use client::game::{Game, Phase};
use client::input::Intent;
use client::network::connect;
use shared::{ClientMessage, ServerMessage, RUNNER_COUNT};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};

/// Server end of one client connection.
struct ScriptedServer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl ScriptedServer {
    async fn send(&mut self, message: ServerMessage) {
        self.send_raw(&message.encode()).await;
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Reads client lines until one of the given kind arrives.
    async fn expect_kind(&mut self, kind: char) -> ClientMessage {
        loop {
            let line = timeout(Duration::from_secs(2), self.lines.next_line())
                .await
                .expect("timed out waiting for the client")
                .unwrap()
                .expect("client closed the connection");
            if line.starts_with(kind) {
                return line.parse().unwrap();
            }
        }
    }
}

/// Client game with a clock the test controls.
struct Driver {
    game: Game,
    now: Instant,
}

impl Driver {
    async fn tick_until(
        &mut self,
        intent: Intent,
        step: Duration,
        done: impl Fn(&Game) -> bool,
    ) {
        for _ in 0..500 {
            if done(&self.game) {
                return;
            }
            self.game.update(intent, self.now);
            self.now += step;
            sleep(Duration::from_millis(1)).await;
        }
        panic!("Condition never met in {:?}", self.game.phase());
    }
}

const FRAME: Duration = Duration::from_millis(16);

fn test_config(server: String) -> ClientConfig {
    ClientConfig {
        server,
        track: TrackConfig {
            start: 50.0,
            finish: 100.0,
            max_frame_interval: 20,
        },
        ..ClientConfig::default()
    }
}

async fn start_session(local_id: usize) -> (ScriptedServer, Driver) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let accept = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, writer) = stream.into_split();
        let mut server = ScriptedServer {
            lines: BufReader::new(reader).lines(),
            writer,
        };
        server.send(ServerMessage::AssignedId { id: local_id }).await;
        server
    });

    let config = test_config(addr);
    let connection = tokio_test::assert_ok!(connect(&config.server, 8).await);
    assert_eq!(connection.client_id, local_id);

    let mut server = accept.await.unwrap();
    assert_eq!(server.expect_kind('c').await, ClientMessage::Connected);

    let now = Instant::now();
    let game = Game::new(
        connection.client_id,
        connection.inbound,
        connection.outbound,
        &config,
        now,
    );

    (server, Driver { game, now })
}

/// FULL ROUND TESTS
mod round_tests {
    use super::*;

    /// Plays one complete round and the restart over TCP
    #[tokio::test]
    async fn full_round_over_tcp() {
        let (mut server, mut client) = start_session(1).await;

        // Lobby
        server.send(ServerMessage::ClientsInQueue { count: 2 }).await;
        client
            .tick_until(Intent::Idle, FRAME, |game| game.clients_count() == 2)
            .await;
        server.send(ServerMessage::AllConnected).await;
        client
            .tick_until(Intent::Action, FRAME, |game| {
                game.phase() == Phase::ChooseRunner
            })
            .await;
        assert_eq!(
            server.expect_kind('n').await,
            ClientMessage::NeedClientCount
        );

        // Runner choice
        server.send(ServerMessage::ClientsInQueue { count: 3 }).await;
        client
            .tick_until(Intent::Idle, FRAME, |game| game.clients_count() == 1)
            .await;

        client.game.update(Intent::Next, client.now);
        assert_eq!(
            server.expect_kind('p').await,
            ClientMessage::RunnerChoice { id: 1, color: 2 }
        );
        client.game.update(Intent::Action, client.now);
        assert_eq!(
            server.expect_kind('r').await,
            ClientMessage::RunnerChosen { selected: true }
        );

        server.send(ServerMessage::RunnerChoice { id: 0, color: 5 }).await;
        server.send(ServerMessage::AllRunnersChosen).await;
        client
            .tick_until(Intent::Idle, FRAME, |game| game.phase() == Phase::LaunchRun)
            .await;
        client
            .tick_until(Intent::Idle, FRAME, |game| {
                game.roster().snapshot()[0].color == 5
            })
            .await;

        // Countdown
        server.send(ServerMessage::StartRace).await;
        client
            .tick_until(Intent::Idle, Duration::from_millis(1100), |game| {
                game.phase() == Phase::Run
            })
            .await;

        // Race
        server.send_raw("x0 400 10").await;
        client
            .tick_until(Intent::Action, FRAME, |game| game.roster().local().arrived)
            .await;
        let finish = server.expect_kind('f').await;
        assert!(matches!(finish, ClientMessage::FinishRace { .. }));

        server
            .send(ServerMessage::RaceFinished {
                times: [3000, 2500, 4000, 5000].map(Duration::from_millis),
            })
            .await;
        client
            .tick_until(Intent::Idle, FRAME, |game| game.phase() == Phase::Result)
            .await;

        let runners = client.game.roster().snapshot();
        assert!(runners.iter().all(|runner| runner.arrived));
        assert_eq!(runners[1].run_time, Duration::from_millis(2500));
        assert_approx_eq!(runners[0].position, 400.0);

        // Results and restart
        client
            .tick_until(Intent::Action, FRAME, |game| game.step() == 4)
            .await;
        client.game.update(Intent::Action, client.now);
        assert_eq!(server.expect_kind('w').await, ClientMessage::WishRestart);

        server.send(ServerMessage::StartRace).await;
        client
            .tick_until(Intent::Idle, FRAME, |game| game.phase() == Phase::LaunchRun)
            .await;

        let runners = client.game.roster().snapshot();
        assert!(runners.iter().all(|runner| !runner.arrived));
        assert_eq!(client.game.final_times(), &[Duration::ZERO; RUNNER_COUNT]);
    }

    /// A malformed line does not derail the lobby
    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let (mut server, mut client) = start_session(0).await;

        server.send_raw("qlots").await;
        server.send_raw("?unknown").await;
        server.send(ServerMessage::ClientsInQueue { count: 1 }).await;
        client
            .tick_until(Intent::Idle, FRAME, |game| game.clients_count() == 1)
            .await;
        assert_eq!(client.game.phase(), Phase::WelcomeScreen);
        assert!(!client.game.is_disconnected());
    }
}

/// CONNECTION TESTS
mod connection_tests {
    use super::*;

    /// The client notices when the server goes away
    #[tokio::test]
    async fn server_hangup_disconnects_game() {
        let (server, mut client) = start_session(2).await;
        drop(server);

        client
            .tick_until(Intent::Idle, FRAME, |game| game.is_disconnected())
            .await;
    }

    /// A first message other than the assigned id fails the handshake
    #[tokio::test]
    async fn handshake_requires_assigned_id() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"a\n").await.unwrap();
            sleep(Duration::from_millis(200)).await;
        });

        let result = connect(&addr, 4).await;
        assert!(matches!(result, Err(ConnectionError::Handshake(line)) if line == "a"));
    }
}
