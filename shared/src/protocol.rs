//! Line protocol between race clients and the coordinating server
//!
//! Every message is a single line: one discriminator character followed by a
//! kind-specific payload whose fields are separated by spaces. Framing is the
//! transport's job, so nothing here deals with newlines beyond trimming them.

use crate::{COLOR_SCHEMES, RUNNER_COUNT};
use std::fmt;
use std::str::{FromStr, SplitWhitespace};
use std::time::Duration;
use thiserror::Error;

pub const ASSIGNED_ID: char = 'i';
pub const CLIENT_CONNECTED: char = 'c';
pub const ALL_CONNECTED: char = 'a';
pub const NEED_CLIENT_COUNT: char = 'n';
pub const CLIENTS_IN_QUEUE: char = 'q';
pub const RUNNER_CHOICE: char = 'p';
pub const RUNNER_CHOSEN: char = 'r';
pub const ALL_RUNNERS_CHOSEN: char = 'k';
pub const START_RACE: char = 's';
pub const RUNNER_POSITION: char = 'x';
/// Client to server it carries one elapsed time, server to client the full
/// list of race times.
pub const FINISH_RACE: char = 'f';
pub const WISH_RESTART: char = 'w';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("unknown message kind '{0}'")]
    UnknownKind(char),
    #[error("missing {field} in '{kind}' message")]
    MissingField { kind: char, field: &'static str },
    #[error("invalid {field} '{value}' in '{kind}' message")]
    InvalidNumber {
        kind: char,
        field: &'static str,
        value: String,
    },
    #[error("unexpected field '{value}' in '{kind}' message")]
    TrailingField { kind: char, value: String },
    #[error("expected {expected} race times, got {got}")]
    RunnerCount { expected: usize, got: usize },
    #[error("runner id {0} out of range")]
    RunnerOutOfRange(usize),
    #[error("colour scheme {0} out of range")]
    ColorOutOfRange(usize),
}

/// Position report for one runner, sent by its owner and relayed to peers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerPosition {
    pub id: usize,
    pub position: f64,
    pub speed: f64,
}

/// Messages a client emits.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Connected,
    NeedClientCount,
    RunnerChoice { id: usize, color: usize },
    RunnerChosen { selected: bool },
    Position(RunnerPosition),
    FinishRace { elapsed: Duration },
    WishRestart,
}

/// Messages a client receives, including relayed peer messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    AssignedId { id: usize },
    AllConnected,
    ClientsInQueue { count: usize },
    RunnerChoice { id: usize, color: usize },
    AllRunnersChosen,
    StartRace,
    Position(RunnerPosition),
    RaceFinished { times: [Duration; RUNNER_COUNT] },
}

impl ClientMessage {
    pub fn kind(&self) -> char {
        match self {
            ClientMessage::Connected => CLIENT_CONNECTED,
            ClientMessage::NeedClientCount => NEED_CLIENT_COUNT,
            ClientMessage::RunnerChoice { .. } => RUNNER_CHOICE,
            ClientMessage::RunnerChosen { .. } => RUNNER_CHOSEN,
            ClientMessage::Position(_) => RUNNER_POSITION,
            ClientMessage::FinishRace { .. } => FINISH_RACE,
            ClientMessage::WishRestart => WISH_RESTART,
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl ServerMessage {
    pub fn kind(&self) -> char {
        match self {
            ServerMessage::AssignedId { .. } => ASSIGNED_ID,
            ServerMessage::AllConnected => ALL_CONNECTED,
            ServerMessage::ClientsInQueue { .. } => CLIENTS_IN_QUEUE,
            ServerMessage::RunnerChoice { .. } => RUNNER_CHOICE,
            ServerMessage::AllRunnersChosen => ALL_RUNNERS_CHOSEN,
            ServerMessage::StartRace => START_RACE,
            ServerMessage::Position(_) => RUNNER_POSITION,
            ServerMessage::RaceFinished { .. } => FINISH_RACE,
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RunnerPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.id, self.position, self.speed)
    }
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())?;
        match self {
            ClientMessage::RunnerChoice { id, color } => write!(f, "{} {}", id, color),
            ClientMessage::RunnerChosen { selected } => write!(f, "{}", u8::from(*selected)),
            ClientMessage::Position(report) => write!(f, "{}", report),
            ClientMessage::FinishRace { elapsed } => write!(f, "{}", elapsed.as_millis()),
            ClientMessage::Connected
            | ClientMessage::NeedClientCount
            | ClientMessage::WishRestart => Ok(()),
        }
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())?;
        match self {
            ServerMessage::AssignedId { id } => write!(f, "{}", id),
            ServerMessage::ClientsInQueue { count } => write!(f, "{}", count),
            ServerMessage::RunnerChoice { id, color } => write!(f, "{} {}", id, color),
            ServerMessage::Position(report) => write!(f, "{}", report),
            ServerMessage::RaceFinished { times } => {
                let mut separator = "";
                for time in times {
                    write!(f, "{}{}", separator, time.as_millis())?;
                    separator = " ";
                }
                Ok(())
            }
            ServerMessage::AllConnected
            | ServerMessage::AllRunnersChosen
            | ServerMessage::StartRace => Ok(()),
        }
    }
}

impl FromStr for ClientMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = Fields::split(line)?;

        let message = match fields.kind {
            CLIENT_CONNECTED => ClientMessage::Connected,
            NEED_CLIENT_COUNT => ClientMessage::NeedClientCount,
            RUNNER_CHOICE => {
                let (id, color) = fields.runner_choice()?;
                ClientMessage::RunnerChoice { id, color }
            }
            RUNNER_CHOSEN => match fields.number::<u8>("selection flag")? {
                0 => ClientMessage::RunnerChosen { selected: false },
                1 => ClientMessage::RunnerChosen { selected: true },
                other => {
                    return Err(ProtocolError::InvalidNumber {
                        kind: RUNNER_CHOSEN,
                        field: "selection flag",
                        value: other.to_string(),
                    })
                }
            },
            RUNNER_POSITION => ClientMessage::Position(fields.position()?),
            FINISH_RACE => ClientMessage::FinishRace {
                elapsed: fields.millis("elapsed time")?,
            },
            WISH_RESTART => ClientMessage::WishRestart,
            other => return Err(ProtocolError::UnknownKind(other)),
        };

        fields.end()?;
        Ok(message)
    }
}

impl FromStr for ServerMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = Fields::split(line)?;

        let message = match fields.kind {
            ASSIGNED_ID => ServerMessage::AssignedId {
                id: fields.runner_id()?,
            },
            ALL_CONNECTED => ServerMessage::AllConnected,
            CLIENTS_IN_QUEUE => ServerMessage::ClientsInQueue {
                count: fields.number("client count")?,
            },
            RUNNER_CHOICE => {
                let (id, color) = fields.runner_choice()?;
                ServerMessage::RunnerChoice { id, color }
            }
            ALL_RUNNERS_CHOSEN => ServerMessage::AllRunnersChosen,
            START_RACE => ServerMessage::StartRace,
            RUNNER_POSITION => ServerMessage::Position(fields.position()?),
            FINISH_RACE => ServerMessage::RaceFinished {
                times: fields.race_times()?,
            },
            other => return Err(ProtocolError::UnknownKind(other)),
        };

        fields.end()?;
        Ok(message)
    }
}

/// Cursor over the payload fields of one message.
struct Fields<'a> {
    kind: char,
    parts: SplitWhitespace<'a>,
}

impl<'a> Fields<'a> {
    fn split(line: &'a str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut chars = line.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;

        Ok(Fields {
            kind,
            parts: chars.as_str().split_whitespace(),
        })
    }

    fn next(&mut self, field: &'static str) -> Result<&'a str, ProtocolError> {
        self.parts.next().ok_or(ProtocolError::MissingField {
            kind: self.kind,
            field,
        })
    }

    /// Fails if any payload field was left unread.
    fn end(mut self) -> Result<(), ProtocolError> {
        match self.parts.next() {
            Some(extra) => Err(ProtocolError::TrailingField {
                kind: self.kind,
                value: extra.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn number<T: FromStr>(&mut self, field: &'static str) -> Result<T, ProtocolError> {
        let raw = self.next(field)?;
        raw.parse().map_err(|_| ProtocolError::InvalidNumber {
            kind: self.kind,
            field,
            value: raw.to_string(),
        })
    }

    fn finite(&mut self, field: &'static str) -> Result<f64, ProtocolError> {
        let raw = self.next(field)?;
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(ProtocolError::InvalidNumber {
                kind: self.kind,
                field,
                value: raw.to_string(),
            }),
        }
    }

    fn millis(&mut self, field: &'static str) -> Result<Duration, ProtocolError> {
        self.number::<u64>(field).map(Duration::from_millis)
    }

    fn runner_id(&mut self) -> Result<usize, ProtocolError> {
        let id = self.number("runner id")?;
        if id >= RUNNER_COUNT {
            return Err(ProtocolError::RunnerOutOfRange(id));
        }
        Ok(id)
    }

    fn runner_choice(&mut self) -> Result<(usize, usize), ProtocolError> {
        let id = self.runner_id()?;
        let color = self.number("colour scheme")?;
        if color >= COLOR_SCHEMES {
            return Err(ProtocolError::ColorOutOfRange(color));
        }
        Ok((id, color))
    }

    fn position(&mut self) -> Result<RunnerPosition, ProtocolError> {
        Ok(RunnerPosition {
            id: self.runner_id()?,
            position: self.finite("position")?,
            speed: self.finite("speed")?,
        })
    }

    fn race_times(&mut self) -> Result<[Duration; RUNNER_COUNT], ProtocolError> {
        let mut times = [Duration::ZERO; RUNNER_COUNT];
        let mut got = 0;

        while let Some(raw) = self.parts.next() {
            if got == RUNNER_COUNT {
                return Err(ProtocolError::RunnerCount {
                    expected: RUNNER_COUNT,
                    got: got + 1 + self.parts.by_ref().count(),
                });
            }
            let millis = raw.parse::<u64>().map_err(|_| ProtocolError::InvalidNumber {
                kind: self.kind,
                field: "race time",
                value: raw.to_string(),
            })?;
            times[got] = Duration::from_millis(millis);
            got += 1;
        }

        if got != RUNNER_COUNT {
            return Err(ProtocolError::RunnerCount {
                expected: RUNNER_COUNT,
                got,
            });
        }
        Ok(times)
    }
}
