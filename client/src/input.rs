//! Local input: the one intent the host samples per frame

use log::warn;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// What the local player asked for during one frame.
///
/// `Action` is the primary key: it confirms on menus and is a stride while racing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Intent {
    #[default]
    Idle,
    Action,
    Previous,
    Next,
}

impl Intent {
    pub fn is_action(self) -> bool {
        self == Intent::Action
    }
}

impl FromStr for Intent {
    type Err = String;

    /// Maps a line typed on the terminal host to an intent.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match line.trim_end_matches(['\r', '\n']) {
            "" | " " | "space" => Ok(Intent::Action),
            "a" | "h" | "<" | "left" => Ok(Intent::Previous),
            "d" | "l" | ">" | "right" => Ok(Intent::Next),
            "." | "idle" => Ok(Intent::Idle),
            other => Err(format!("unrecognised input '{}'", other)),
        }
    }
}

/// Reads intents from stdin, one per line, for the terminal host.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<Intent> {
    let (sender, receiver) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match line.parse::<Intent>() {
                Ok(intent) => {
                    if sender.send(intent).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{}", e),
            }
        }
    });

    receiver
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_from_terminal_lines() {
        assert_eq!("".parse::<Intent>(), Ok(Intent::Action));
        assert_eq!(" \n".parse::<Intent>(), Ok(Intent::Action));
        assert_eq!("a".parse::<Intent>(), Ok(Intent::Previous));
        assert_eq!(">".parse::<Intent>(), Ok(Intent::Next));
        assert_eq!("idle".parse::<Intent>(), Ok(Intent::Idle));
        assert!("jump".parse::<Intent>().is_err());
    }

    #[test]
    fn test_default_intent_is_idle() {
        assert_eq!(Intent::default(), Intent::Idle);
        assert!(!Intent::default().is_action());
        assert!(Intent::Action.is_action());
    }
}
