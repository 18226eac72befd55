//! Line-framed TCP transport and the host loop driving the game

use crate::config::ClientConfig;
use crate::dispatcher::Inbound;
use crate::error::{ClientError, ConnectionError};
use crate::game::{Game, Outbound, Phase, RaceView};
use crate::input::Intent;
use log::{debug, error, info, warn};
use shared::{ClientMessage, ProtocolError, ServerMessage};
use std::io;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// An established session: the id the server assigned and both message queues.
pub struct Connection {
    pub client_id: usize,
    pub inbound: Inbound,
    pub outbound: Outbound,
}

/// Decodes one inbound line. Malformed lines are logged and dropped rather
/// than guessed at; unknown kinds are not part of the protocol and ignored.
pub fn decode_line(line: &str) -> Option<ServerMessage> {
    match line.parse::<ServerMessage>() {
        Ok(message) => {
            debug!("Received {:?}", message);
            Some(message)
        }
        Err(ProtocolError::UnknownKind(kind)) => {
            debug!("Ignoring unknown message kind '{}'", kind);
            None
        }
        Err(e) => {
            warn!("Discarding malformed message '{}': {}", line, e);
            None
        }
    }
}

pub async fn connect(addr: &str, inbound_capacity: usize) -> Result<Connection, ConnectionError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| ConnectionError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    info!("Connected to {}", addr);

    let (reader, writer) = stream.into_split();
    let (inbound_tx, mut inbound) = mpsc::channel(inbound_capacity.max(1));
    let (outbound, outbound_rx) = mpsc::unbounded_channel();

    spawn_reader(reader, inbound_tx);
    spawn_writer(writer, outbound_rx);

    let client_id = handshake(&mut inbound, &outbound).await?;
    info!("Server assigned client id {}", client_id);

    Ok(Connection {
        client_id,
        inbound,
        outbound,
    })
}

/// Waits for the assigned id, then announces the client.
pub async fn handshake(
    inbound: &mut Inbound,
    outbound: &Outbound,
) -> Result<usize, ConnectionError> {
    let line = inbound.recv().await.ok_or(ConnectionError::Closed)?;

    match line.parse::<ServerMessage>() {
        Ok(ServerMessage::AssignedId { id }) => {
            outbound
                .send(ClientMessage::Connected.encode())
                .map_err(|_| ConnectionError::Announce)?;
            Ok(id)
        }
        _ => Err(ConnectionError::Handshake(line)),
    }
}

/// Forwards each received line. A full queue holds the reader back instead
/// of dropping lines.
fn spawn_reader(reader: OwnedReadHalf, inbound: mpsc::Sender<String>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.is_empty() {
                        continue;
                    }
                    if inbound.send(line).await.is_err() {
                        debug!("Inbound queue dropped, stopping reader");
                        break;
                    }
                }
                Ok(None) => {
                    info!("Server closed the connection");
                    break;
                }
                Err(e) => {
                    error!("Error reading from server: {}", e);
                    break;
                }
            }
        }
    });
}

fn spawn_writer(writer: OwnedWriteHalf, mut outbound: mpsc::UnboundedReceiver<String>) {
    tokio::spawn(async move {
        let mut writer = BufWriter::new(writer);

        while let Some(line) = outbound.recv().await {
            if let Err(e) = write_line(&mut writer, &line).await {
                error!("Error writing to server: {}", e);
                break;
            }
        }
    });
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Headless host: ticks the game at a fixed rate and logs what a renderer
/// would show.
pub struct Client {
    game: Game,
    intents: mpsc::UnboundedReceiver<Intent>,
    config: ClientConfig,
    last_status: String,
}

impl Client {
    pub async fn new(
        config: ClientConfig,
        intents: mpsc::UnboundedReceiver<Intent>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let connection = connect(&config.server, config.inbound_capacity).await?;

        let game = Game::new(
            connection.client_id,
            connection.inbound,
            connection.outbound,
            &config,
            Instant::now(),
        );

        Ok(Client {
            game,
            intents,
            config,
            last_status: String::new(),
        })
    }

    /// One queued intent per tick, so fast typing is not collapsed.
    fn next_intent(&mut self) -> Intent {
        self.intents.try_recv().unwrap_or_default()
    }

    pub async fn run(&mut self) -> Result<(), ClientError> {
        let mut ticker = interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let intent = self.next_intent();
            self.game.update(intent, Instant::now());
            self.report();

            if self.game.is_disconnected() {
                return Err(ClientError::Disconnected);
            }
        }
    }

    fn report(&mut self) {
        let status = status_line(&self.game.view());
        if status != self.last_status {
            info!("{}", status);
            self.last_status = status;
        }
    }
}

/// One-line summary of a frame, without per-frame positions.
pub fn status_line(view: &RaceView) -> String {
    match view.phase {
        Phase::WelcomeScreen => format!(
            "Welcome, runner {}: {} client(s) still connecting",
            view.local_id, view.clients_count
        ),
        Phase::ChooseRunner => format!(
            "Choose your runner: colour {}{}, {} still choosing",
            view.runners[view.local_id].color,
            if view.runners[view.local_id].selected {
                " (selected)"
            } else {
                ""
            },
            view.clients_count
        ),
        Phase::LaunchRun => format!(
            "Get ready: {}",
            shared::COUNTDOWN_STEPS.saturating_sub(view.step)
        ),
        Phase::Run => {
            let arrived = view.runners.iter().filter(|runner| runner.arrived).count();
            format!("Racing: {}/{} arrived", arrived, view.runners.len())
        }
        Phase::Result => {
            let revealed = (view.step as usize).min(view.final_times.len());
            let times: Vec<String> = view.final_times[..revealed]
                .iter()
                .enumerate()
                .map(|(id, time)| format!("#{} {:.2}s", id, time.as_secs_f64()))
                .collect();
            format!(
                "Results: [{}] {} client(s) ready for another race",
                times.join(", "),
                view.clients_count
            )
        }
    }
}
