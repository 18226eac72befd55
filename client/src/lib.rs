//! # Race Client Library
//!
//! Client side of a four-player racing game. Players connect to a coordinating
//! server, pick a runner colour, race along a fixed track and see the results,
//! round after round. The server decides when each stage of a round begins;
//! the client keeps its own runner responsive and mirrors everyone else.
//!
//! ## Architecture Overview
//!
//! ### Fixed-Rate Simulation
//! A host ticks [`game::Game`] once per frame with the local player's intent
//! and the current time. A tick never blocks: inbound messages are taken only
//! if one is already queued and outbound messages go onto an unbounded queue.
//!
//! ### Server-Authoritative Phases
//! A round moves through five phases (welcome, runner choice, countdown, race,
//! results, then back to the countdown). Local timers only gate when the
//! client may move on once the server's signal for that phase has arrived.
//!
//! ### Partitioned Race State
//! During the race a dispatcher task owns the inbound queue and updates the
//! remote runners from peer position reports. The tick owns the local runner.
//! The split is enforced by types: the dispatcher only gets a handle to the
//! remote runners, and the inbound queue travels back to the game with the
//! race outcome.
//!
//! ## Module Organization
//!
//! - `config`: settings file and defaults
//! - `dispatcher`: race-time reconciliation of remote runners
//! - `error`: connection and configuration failures
//! - `field`: track geometry and phase chronometer
//! - `game`: the phase state machine
//! - `input`: per-frame intents
//! - `network`: TCP transport, handshake and the headless host loop
//! - `roster`: local/remote runner ownership
//! - `runner`: per-player race state
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::ClientConfig;
//! use client::input::spawn_stdin_reader;
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::default();
//!     let mut client = Client::new(config, spawn_stdin_reader()).await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod field;
pub mod game;
pub mod input;
pub mod network;
pub mod roster;
pub mod runner;
