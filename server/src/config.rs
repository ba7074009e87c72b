//! Command-line flags and the resolved server configuration

use crate::client_manager::DEFAULT_CLIENT_TIMEOUT;
use crate::error::{Result, ServerError};
use clap::Parser;
use log::info;
use shared::GameConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Authoritative arena server")]
pub struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "60")]
    pub tick_rate: u32,

    /// Maximum concurrent clients
    #[arg(short, long, default_value = "16")]
    pub max_clients: usize,

    /// TOML file with gameplay rules and arena layout
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "5")]
    pub timeout: u64,
}

impl Args {
    pub fn into_config(self) -> Result<ServerConfig> {
        let addr = format!("{}:{}", self.host, self.port);
        let bind_addr: SocketAddr = addr
            .parse()
            .map_err(|_| ServerError::InvalidAddress(addr.clone()))?;

        let game = match &self.config {
            Some(path) => {
                info!("Loading game config from {}", path.display());
                GameConfig::load(path)?
            }
            None => GameConfig::default(),
        };

        Ok(ServerConfig {
            bind_addr,
            tick_duration: tick_duration(self.tick_rate),
            max_clients: self.max_clients,
            client_timeout: Duration::from_secs(self.timeout),
            game,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub tick_duration: Duration,
    pub max_clients: usize,
    pub client_timeout: Duration,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            tick_duration: tick_duration(60),
            max_clients: 16,
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
            game: GameConfig::default(),
        }
    }
}

/// Tick period for a rate in Hz; a zero rate is treated as 1Hz
pub fn tick_duration(tick_rate: u32) -> Duration {
    Duration::from_secs_f64(1.0 / tick_rate.max(1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["server"]);
        assert_eq!(args.host, "127.0.0.1");
        assert_eq!(args.port, 8080);
        assert_eq!(args.tick_rate, 60);
        assert_eq!(args.max_clients, 16);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_args_into_config() {
        let args = Args::parse_from(["server", "-H", "0.0.0.0", "-p", "9000", "-t", "30"]);
        let config = args.into_config().unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.tick_duration, Duration::from_secs_f64(1.0 / 30.0));
        assert_eq!(config.client_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_bad_host_is_rejected() {
        let args = Args::parse_from(["server", "--host", "not an ip"]);
        assert!(matches!(
            args.into_config(),
            Err(ServerError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let args = Args::parse_from(["server", "--config", "/nonexistent/arena.toml"]);
        assert!(matches!(args.into_config(), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_zero_tick_rate() {
        assert_eq!(tick_duration(0), Duration::from_secs(1));
    }
}
