//! Flood Prediction Service - Main Daemon
//!
//! Accepts environmental sensor readings over HTTP, stores them, and
//! classifies 24h / 48h flood risk from the most recent rolling window.
//!
//! Usage:
//!   cargo run --release                          # PostgreSQL store, port from config
//!   cargo run --release -- --endpoint 8080       # Override the HTTP port
//!   cargo run --release -- --memory-store        # Throwaway in-process store
//!   cargo run --release -- --config other.toml   # Explicit config file
//!
//! Environment:
//!   DATABASE_URL   - PostgreSQL connection string (PostgreSQL store only)
//!   FLOPRED_CONFIG - config file path (default: predictor.toml)
//!   PORT           - HTTP port override
//!   FLOPRED_ENV    - `development` disables API key checks
//!   RUST_LOG       - log filter override

use flopred_service::config::{self, ServiceConfig};
use flopred_service::daemon::{Daemon, StoreBackend};
use std::env;
use std::path::PathBuf;
use tracing::{error, info};

struct Args {
    port: Option<u16>,
    backend: StoreBackend,
    config_path: Option<PathBuf>,
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {} [--endpoint PORT] [--memory-store] [--config PATH]",
        program
    )
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args {
        port: None,
        backend: StoreBackend::Postgres,
        config_path: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--endpoint" => {
                let value = args.get(i + 1).ok_or("--endpoint requires a port number")?;
                parsed.port = Some(
                    value
                        .parse()
                        .map_err(|_| format!("invalid port '{}'", value))?,
                );
                i += 2;
            }
            "--config" => {
                let value = args.get(i + 1).ok_or("--config requires a file path")?;
                parsed.config_path = Some(PathBuf::from(value));
                i += 2;
            }
            "--memory-store" => {
                parsed.backend = StoreBackend::Memory;
                i += 1;
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }

    Ok(parsed)
}

fn load(args: &Args) -> Result<ServiceConfig, flopred_service::error::ConfigError> {
    let mut service_config = match &args.config_path {
        Some(path) => {
            dotenv::dotenv().ok();
            let mut loaded = config::load_config_from(path)?;
            loaded.apply_env_overrides();
            loaded
        }
        None => config::load_config()?,
    };

    if let Some(port) = args.port {
        service_config.endpoint.port = port;
    }
    Ok(service_config)
}

fn main() {
    let argv: Vec<String> = env::args().collect();
    let program = argv.first().map(String::as_str).unwrap_or("flopred_service");

    let args = match parse_args(&argv) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", usage(program));
            std::process::exit(1);
        }
    };

    let service_config = match load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Configuration error: {}\n", e);
            std::process::exit(1);
        }
    };

    let mut daemon = Daemon::new(service_config, args.backend);
    let telemetry = daemon.telemetry().clone();

    let exit_code = telemetry.scope(|| {
        info!(
            port = daemon.config().endpoint.port,
            backend = ?args.backend,
            "🌊 Flood Prediction Service starting"
        );

        if let Err(e) = daemon.initialize() {
            error!("Initialization failed: {}", e);
            eprintln!("\n❌ Initialization failed: {}\n", e);
            return 1;
        }
        info!("✓ Daemon initialized");

        if let Err(e) = daemon.run() {
            error!("Daemon error: {}", e);
            eprintln!("\n❌ Daemon error: {}", e);
            return 1;
        }
        0
    });

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("flopred_service")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_all_flags() {
        let argv = argv(&["--endpoint", "8080", "--memory-store", "--config", "x.toml"]);
        let args = parse_args(&argv).unwrap();
        assert_eq!(args.port, Some(8080));
        assert_eq!(args.backend, StoreBackend::Memory);
        assert_eq!(args.config_path, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn test_defaults_to_postgres() {
        let args = parse_args(&argv(&[])).unwrap();
        assert_eq!(args.backend, StoreBackend::Postgres);
        assert!(args.port.is_none());
    }

    #[test]
    fn test_bad_arguments() {
        assert!(parse_args(&argv(&["--endpoint"])).is_err());
        assert!(parse_args(&argv(&["--endpoint", "http"])).is_err());
        assert!(parse_args(&argv(&["--verbose"])).is_err());
    }
}
