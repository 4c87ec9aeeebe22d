use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use shared::Shutdown;
use std::path::PathBuf;

/// Authoritative arena server.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Interface to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
    /// Simulation and broadcast period in milliseconds
    #[arg(short, long)]
    tick_ms: Option<u64>,
    /// Maximum number of simultaneous clients
    #[arg(short, long)]
    max_clients: Option<usize>,
}

impl Args {
    /// Loads the file (or defaults) and applies command line overrides on top.
    fn into_config(self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.tick_ms = tick_ms;
        }
        if self.max_clients.is_some() {
            config.max_clients = self.max_clients;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;
    let server = Server::bind(config).await?;

    let shutdown = Shutdown::new();
    let mut server_handle = tokio::spawn(server.run(shutdown.signal()));

    tokio::select! {
        result = &mut server_handle => {
            return match result? {
                Ok(()) => Ok(()),
                Err(e) => {
                    error!("Server stopped: {}", e);
                    Err(e.into())
                }
            };
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    shutdown.trigger();
    server_handle.await??;
    Ok(())
}
