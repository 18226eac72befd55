//! Error kinds surfaced by the client library

use std::io;
use thiserror::Error;

/// Failures while establishing the session with the server. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("connection closed before the server assigned a client id")]
    Closed,
    #[error("expected a client id from the server, got '{0}'")]
    Handshake(String),
    #[error("failed to announce the client to the server")]
    Announce,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("lost connection to the server")]
    Disconnected,
}
