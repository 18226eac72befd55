use clap::Parser;
use client::config::ClientConfig;
use client::input::spawn_stdin_reader;
use client::network::Client;
use log::info;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long)]
    server: Option<String>,

    /// TOML settings file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Simulation ticks per second
    #[arg(short = 't', long)]
    tick_rate: Option<u32>,

    /// Seconds to wait for race results before using local times (0 waits forever)
    #[arg(long)]
    finish_timeout: Option<u64>,

    /// Inbound messages buffered between the socket and the game
    #[arg(long)]
    inbound_capacity: Option<usize>,
}

impl Args {
    fn into_config(self) -> Result<ClientConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::default(),
        };

        if let Some(server) = self.server {
            config.server = server;
        }
        if let Some(tick_rate) = self.tick_rate {
            config.tick_rate = tick_rate;
        }
        if let Some(finish_timeout) = self.finish_timeout {
            config.finish_timeout_secs = finish_timeout;
        }
        if let Some(inbound_capacity) = self.inbound_capacity {
            config.inbound_capacity = inbound_capacity;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Args::parse().into_config()?;

    info!("Starting client...");
    info!("Connecting to: {}", config.server);
    info!("Controls: Enter to confirm or stride, a/d then Enter to change colour");

    let mut client = Client::new(config, spawn_stdin_reader()).await?;

    client.run().await?;

    Ok(())
}
